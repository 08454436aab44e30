//! Post-recognition text stages: repair, structuring and field validation.

mod repair;
mod structure;
mod validate;
pub mod rules;

pub use repair::{repair, TextRepairer};
pub use rules::{Replacement, RuleSet, RuleTable};
pub use structure::{structure, TextStructurer};
pub use validate::{validate, FieldValidator};
