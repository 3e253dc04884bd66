//! Mapping rule definitions.
//!
//! A [`MappingSpec`] is the parsed form of the mapping sheet: one
//! [`MappingRule`] per canonical output field, kept in declaration order.

use serde::Serialize;

use crate::models::Field;

/// How a rule obtains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Copy one source column.
    Direct,
    /// Join several source columns.
    Combined,
    /// No source column; filled by the inference service.
    AiInferred,
}

/// Join policy for [`RuleKind::Combined`] rules.
///
/// Present values are joined in source order; blank values are elided so
/// no stray separator is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Combinator {
    pub separator: String,
}

impl Combinator {
    pub fn join<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> String {
        parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

impl Default for Combinator {
    fn default() -> Self {
        Self {
            separator: " ".to_string(),
        }
    }
}

/// One row of the mapping sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    /// Canonical target field.
    pub output_field: Field,

    /// Output label as written in the sheet, annotations stripped.
    pub label: String,

    pub kind: RuleKind,

    /// Source column names, annotations stripped.
    pub source_fields: Vec<String>,

    /// Join policy, only for `Combined` rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combinator: Option<Combinator>,

    /// 1-based line in the sheet (0 for rules built in code).
    pub line: usize,
}

impl MappingRule {
    /// Create a rule copying a single source column.
    pub fn direct(output_field: Field, source: &str) -> Self {
        Self {
            output_field,
            label: output_field.name().to_string(),
            kind: RuleKind::Direct,
            source_fields: vec![source.to_string()],
            combinator: None,
            line: 0,
        }
    }

    /// Create a rule joining several source columns with a space.
    pub fn combined(output_field: Field, sources: Vec<String>) -> Self {
        Self {
            output_field,
            label: output_field.name().to_string(),
            kind: RuleKind::Combined,
            source_fields: sources,
            combinator: Some(Combinator::default()),
            line: 0,
        }
    }

    /// Create a rule left to the inference service.
    pub fn ai_inferred(output_field: Field) -> Self {
        Self {
            output_field,
            label: output_field.name().to_string(),
            kind: RuleKind::AiInferred,
            source_fields: Vec::new(),
            combinator: None,
            line: 0,
        }
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        if self.kind == RuleKind::Combined {
            self.combinator = Some(Combinator {
                separator: separator.to_string(),
            });
        }
        self
    }

    pub(crate) fn at_line(mut self, line: usize, label: &str) -> Self {
        self.line = line;
        self.label = label.to_string();
        self
    }
}

/// The complete, ordered rule set for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingSpec {
    rules: Vec<MappingRule>,
}

impl MappingSpec {
    /// Build a spec from rules, rejecting a repeated output field.
    ///
    /// Returns the offending field on duplicates; the text parser reports
    /// duplicates with line numbers before reaching this point.
    pub fn from_rules(rules: Vec<MappingRule>) -> Result<Self, Field> {
        let mut seen = Vec::with_capacity(rules.len());
        for rule in &rules {
            if seen.contains(&rule.output_field) {
                return Err(rule.output_field);
            }
            seen.push(rule.output_field);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule targeting `field`, if any.
    pub fn rule_for(&self, field: Field) -> Option<&MappingRule> {
        self.rules.iter().find(|r| r.output_field == field)
    }

    /// All source columns referenced by the rules, deduplicated and sorted.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .rules
            .iter()
            .flat_map(|r| r.source_fields.iter().cloned())
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }

    /// Source columns the given headers do not provide.
    ///
    /// Missing columns are not an error (resolution reports them per record)
    /// but are worth a warning before a run.
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinator_elides_blank_parts() {
        let c = Combinator::default();
        assert_eq!(c.join(["John", "", "  Smith "]), "John Smith");
        assert_eq!(c.join(["", "  "]), "");
    }

    #[test]
    fn test_from_rules_rejects_duplicates() {
        let rules = vec![
            MappingRule::direct(Field::Name, "Name"),
            MappingRule::ai_inferred(Field::Name),
        ];
        assert_eq!(MappingSpec::from_rules(rules), Err(Field::Name));
    }

    #[test]
    fn test_validate_headers() {
        let spec = MappingSpec::from_rules(vec![
            MappingRule::combined(Field::Name, vec!["First".into(), "Last".into()]),
            MappingRule::direct(Field::Email, "Email"),
        ])
        .unwrap();

        let headers = vec!["First".to_string(), "Last".to_string(), "Email".to_string()];
        assert!(spec.validate_headers(&headers).is_ok());

        let partial = vec!["First".to_string()];
        assert_eq!(
            spec.validate_headers(&partial),
            Err(vec!["Email".to_string(), "Last".to_string()])
        );
    }
}
