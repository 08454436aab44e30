//! Required-field presence check.

use tracing::warn;

use super::rules::{RequiredField, RuleSet};

/// Checks text for the required fields of a [`RuleSet`].
#[derive(Debug, Clone, Copy)]
pub struct FieldValidator<'a> {
    fields: &'a [RequiredField],
}

impl<'a> FieldValidator<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            fields: &rules.required_fields,
        }
    }

    /// Names of the fields with no matching alternative, in table order.
    ///
    /// Only presence is checked, not the correctness of the values.
    pub fn missing_fields(&self, text: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|field| !field.is_present(text))
            .map(|field| {
                warn!("Required field not found: {}", field.name);
                field.name.clone()
            })
            .collect()
    }
}

/// Validate `text` against the given rules.
pub fn validate(text: &str, rules: &RuleSet) -> Vec<String> {
    FieldValidator::new(rules).missing_fields(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn default_rules() -> &'static RuleSet {
        RuleSet::embedded()
    }

    #[test]
    fn test_all_fields_present() {
        let text = "NFS-e\nCNPJ 49.621.411/0001-93\nVALOR TOTAL R$ 750,00";
        assert!(validate(text, default_rules()).is_empty());
    }

    #[test]
    fn test_alternative_patterns_accepted() {
        let text = "nota fiscal de serviços eletrônica\nSUSTENTAMAIS CONSULTORIA\nValor total da nota: 750";
        assert!(validate(text, default_rules()).is_empty());
    }

    #[test]
    fn test_missing_total_detected() {
        let text = "NFSe Sustentamais Consultoria sem valores";
        assert_eq!(validate(text, default_rules()), vec!["Valor Total"]);
    }

    #[test]
    fn test_missing_fields_in_table_order() {
        assert_eq!(
            validate("texto ilegível", default_rules()),
            vec!["NFS-e", "CNPJ Prestador", "Valor Total"]
        );
    }

    #[test]
    fn test_unformatted_cnpj_accepted() {
        let text = "NFS-e 49621411/000193 R$750";
        assert!(validate(text, default_rules()).is_empty());
    }
}
