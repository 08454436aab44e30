//! Loadable rule tables.
//!
//! A rule table is JSON data holding three ordered lists: repair rules,
//! structuring rules and required fields. Tables are compiled once into a
//! [`RuleSet`] and shared read-only by every page.

use std::path::Path;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RuleError;
use crate::models::embedded::DEFAULT_RULES;

/// Group a repair rule belongs to; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Known-garbled token of a specific document.
    Anchor,
    /// Date shape.
    Date,
    /// Digit grouping and separators.
    Numeric,
    /// Fixed vocabulary.
    Term,
}

/// What a matched token is rewritten to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Replacement {
    /// Replacement template; `${1}` refers to capture groups, `$$` is a literal `$`.
    Literal(String),
    /// Remove all whitespace inside the matched token.
    StripWhitespace,
}

/// Serialized repair rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRuleDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RuleCategory>,
    pub pattern: String,
    pub replace: Replacement,
}

/// Serialized structuring rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureRuleDef {
    pub pattern: String,
    pub replacement: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub case_insensitive: bool,
}

/// Serialized required field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredFieldDef {
    pub name: String,
    pub patterns: Vec<String>,
}

/// A rule table as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repair: Vec<RepairRuleDef>,
    #[serde(default)]
    pub structure: Vec<StructureRuleDef>,
    #[serde(default)]
    pub required_fields: Vec<RequiredFieldDef>,
}

impl RuleTable {
    /// Parse a table from JSON text.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a table from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The table embedded in the binary.
    pub fn embedded() -> Result<Self, RuleError> {
        Self::from_json(DEFAULT_RULES)
    }

    pub fn to_json(&self) -> Result<String, RuleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compile every pattern of the table.
    pub fn compile(&self) -> Result<RuleSet, RuleError> {
        let repair = self
            .repair
            .iter()
            .map(|def| {
                Ok(RepairRule {
                    regex: compile(&def.pattern, true)?,
                    replacement: def.replace.clone(),
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        let structure = self
            .structure
            .iter()
            .map(|def| {
                Ok(StructureRule {
                    regex: compile(&def.pattern, def.case_insensitive)?,
                    replacement: def.replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        let required_fields = self
            .required_fields
            .iter()
            .map(|def| {
                if def.patterns.is_empty() {
                    return Err(RuleError::EmptyField(def.name.clone()));
                }
                let patterns = def
                    .patterns
                    .iter()
                    .map(|p| compile(p, true))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RequiredField {
                    name: def.name.clone(),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        debug!(
            "Compiled rule table {:?}: {} repair, {} structure, {} required fields",
            self.name,
            repair.len(),
            structure.len(),
            required_fields.len()
        );

        Ok(RuleSet {
            name: self.name.clone(),
            repair,
            structure,
            required_fields,
        })
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| RuleError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// A compiled repair rule.
#[derive(Debug, Clone)]
pub struct RepairRule {
    pub regex: Regex,
    pub replacement: Replacement,
}

impl RepairRule {
    /// Rewrite every match in `text`.
    pub fn apply(&self, text: &str) -> String {
        match &self.replacement {
            Replacement::Literal(template) => {
                self.regex.replace_all(text, template.as_str()).into_owned()
            }
            Replacement::StripWhitespace => self
                .regex
                .replace_all(text, |caps: &regex::Captures| {
                    caps[0].split_whitespace().collect::<String>()
                })
                .into_owned(),
        }
    }
}

/// A compiled structuring rule.
#[derive(Debug, Clone)]
pub struct StructureRule {
    pub regex: Regex,
    pub replacement: String,
}

impl StructureRule {
    pub fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// A named field with its acceptable patterns.
#[derive(Debug, Clone)]
pub struct RequiredField {
    pub name: String,
    pub patterns: Vec<Regex>,
}

impl RequiredField {
    /// True when any alternative matches somewhere in `text`.
    pub fn is_present(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Compiled, immutable rule tables.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub name: String,
    pub repair: Vec<RepairRule>,
    pub structure: Vec<StructureRule>,
    pub required_fields: Vec<RequiredField>,
}

impl RuleSet {
    /// Load and compile a table file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        RuleTable::from_file(path)?.compile()
    }

    /// The compiled embedded table.
    pub fn embedded() -> &'static RuleSet {
        &EMBEDDED_RULES
    }
}

lazy_static! {
    static ref EMBEDDED_RULES: RuleSet = RuleTable::embedded()
        .and_then(|table| table.compile())
        .expect("embedded rule table is valid");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table_compiles() {
        let rules = RuleSet::embedded();
        assert_eq!(rules.name, "nfse-curitiba");
        assert_eq!(rules.repair.len(), 13);
        assert_eq!(rules.structure.len(), 8);

        let names: Vec<_> = rules.required_fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["NFS-e", "CNPJ Prestador", "Valor Total"]);
    }

    #[test]
    fn test_invalid_pattern_reported() {
        let table = RuleTable::from_json(
            r#"{"repair": [{"pattern": "(unclosed", "replace": {"literal": "x"}}]}"#,
        )
        .unwrap();

        match table.compile() {
            Err(RuleError::Pattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected pattern error, got {:?}", other),
        }
    }

    #[test]
    fn test_field_without_patterns_rejected() {
        let table =
            RuleTable::from_json(r#"{"required_fields": [{"name": "NFS-e", "patterns": []}]}"#)
                .unwrap();
        assert!(matches!(table.compile(), Err(RuleError::EmptyField(name)) if name == "NFS-e"));
    }

    #[test]
    fn test_strip_whitespace_replacement() {
        let rule = RepairRule {
            regex: compile(r"B9 OX B6 08", true).unwrap(),
            replacement: Replacement::StripWhitespace,
        };
        assert_eq!(rule.apply("code b9 ox b6 08 end"), "code b9oxb608 end");
    }

    #[test]
    fn test_table_json_reloads() {
        let table = RuleTable::embedded().unwrap();
        let json = table.to_json().unwrap();
        let reloaded = RuleTable::from_json(&json).unwrap().compile().unwrap();
        assert_eq!(reloaded.repair.len(), table.repair.len());
    }
}
