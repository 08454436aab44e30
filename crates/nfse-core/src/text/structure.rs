//! Layout reconstruction: section separators, label line breaks, spacing.

use super::rules::{RuleSet, StructureRule};

/// Applies the structuring rules of a [`RuleSet`] in table order.
#[derive(Debug, Clone, Copy)]
pub struct TextStructurer<'a> {
    rules: &'a [StructureRule],
}

impl<'a> TextStructurer<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules: &rules.structure,
        }
    }

    /// Reformat `text`. Applying the result again yields the same text.
    pub fn structure(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc))
    }
}

/// Structure `text` with the given rules.
pub fn structure(text: &str, rules: &RuleSet) -> String {
    TextStructurer::new(rules).structure(text)
}
