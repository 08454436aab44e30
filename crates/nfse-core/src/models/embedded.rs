//! Embedded rule data for standalone binary distribution.
//!
//! The default rule table is compiled into the binary so the CLI works
//! without external files. It can be exported, edited and loaded back.

/// Default rule table for Curitiba NFS-e documents.
pub static DEFAULT_RULES: &str = include_str!("../../rules/nfse_curitiba.json");
