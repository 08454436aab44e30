//! Configuration, embedded rule data and pipeline results.

pub mod config;
pub mod embedded;
pub mod result;
