//! Ordered deterministic correction of known recognition errors.

use tracing::trace;

use super::rules::{RepairRule, RuleSet};

/// Applies the repair rules of a [`RuleSet`] in table order.
#[derive(Debug, Clone, Copy)]
pub struct TextRepairer<'a> {
    rules: &'a [RepairRule],
}

impl<'a> TextRepairer<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules: &rules.repair,
        }
    }

    /// Run every rule over the whole text, each on the previous rule's output.
    pub fn repair(&self, text: &str) -> String {
        self.rules.iter().fold(text.to_string(), |acc, rule| {
            let next = rule.apply(&acc);
            if next != acc {
                trace!("Repair rule {:?} rewrote text", rule.regex.as_str());
            }
            next
        })
    }
}

/// Repair `text` with the given rules.
pub fn repair(text: &str, rules: &RuleSet) -> String {
    TextRepairer::new(rules).repair(text)
}
