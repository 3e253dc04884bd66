//! Mapping sheet parser.
//!
//! The sheet is a two-column table, tab or pipe delimited:
//!
//! ```text
//! Input                      Output
//! -                          ID (a)
//! First (FP) + Last (FV)     Name (b)
//! Country (B)                country (R)
//! AI                         Nationality (Z)
//! ```
//!
//! Trailing parenthetical codes such as `(FP)` are annotations and are
//! stripped before names are used.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::rule::{MappingRule, MappingSpec};
use crate::error::{SpecParseError, SpecResult};
use crate::models::Field;

static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([A-Za-z0-9]+\)\s*$").expect("annotation pattern"));

static MARKDOWN_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:?-{3,}:?$").expect("markdown rule pattern"));

const INPUT_HEADERS: &[&str] = &[
    "input",
    "source",
    "from",
    "input field",
    "source field",
    "input column",
    "source column",
    "input expression",
    "existing field",
];

const OUTPUT_HEADERS: &[&str] = &[
    "output",
    "target",
    "to",
    "output field",
    "target field",
    "output column",
    "target column",
    "output expression",
    "new field",
];

/// Parse a mapping sheet into an ordered [`MappingSpec`].
///
/// # Errors
/// Any [`SpecParseError`]; the first offending line wins.
pub fn parse(spec_text: &str) -> SpecResult<MappingSpec> {
    let mut rules = Vec::new();
    let mut declared: HashMap<Field, usize> = HashMap::new();
    let mut first_data_line = true;

    for (idx, raw) in spec_text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let cells = split_cells(line);
        if cells.iter().all(|c| MARKDOWN_RULE.is_match(c)) {
            continue;
        }

        let is_first = std::mem::replace(&mut first_data_line, false);
        if is_first && is_header(&cells) {
            continue;
        }

        let (input, output) = match (cells.first(), cells.get(1)) {
            (Some(i), Some(o)) if !i.is_empty() && !o.is_empty() => (i.as_str(), o.as_str()),
            _ => {
                return Err(SpecParseError::MissingColumns {
                    line: line_no,
                    text: line.to_string(),
                })
            }
        };

        let label = strip_annotations(output);
        let field = Field::from_label(&label).ok_or_else(|| SpecParseError::UnknownOutputField {
            line: line_no,
            field: label.clone(),
        })?;

        if let Some(&first_line) = declared.get(&field) {
            return Err(SpecParseError::DuplicateOutput {
                line: line_no,
                field: field.name().to_string(),
                first_line,
            });
        }
        declared.insert(field, line_no);

        let rule = classify(input, field, line_no)?.at_line(line_no, &label);
        rules.push(rule);
    }

    if rules.is_empty() {
        return Err(SpecParseError::Empty);
    }

    // Duplicates were rejected above with line numbers.
    MappingSpec::from_rules(rules).map_err(|field| SpecParseError::DuplicateOutput {
        line: 0,
        field: field.name().to_string(),
        first_line: 0,
    })
}

/// Remove trailing annotation codes, e.g. `Subject (Array) (c)` -> `Subject`.
pub fn strip_annotations(name: &str) -> String {
    let mut current = name.trim().to_string();
    loop {
        let stripped = ANNOTATION.replace(&current, "").trim().to_string();
        if stripped == current {
            return current;
        }
        current = stripped;
    }
}

fn split_cells(line: &str) -> Vec<String> {
    if line.contains('\t') {
        return line.split('\t').map(|c| c.trim().to_string()).collect();
    }
    if line.contains('|') {
        let inner = line.strip_prefix('|').unwrap_or(line);
        let inner = inner.strip_suffix('|').unwrap_or(inner);
        return inner.split('|').map(|c| c.trim().to_string()).collect();
    }
    vec![line.to_string()]
}

fn is_header(cells: &[String]) -> bool {
    match (cells.first(), cells.get(1)) {
        (Some(i), Some(o)) => {
            let i = i.to_lowercase();
            let o = o.to_lowercase();
            INPUT_HEADERS.contains(&i.as_str()) && OUTPUT_HEADERS.contains(&o.as_str())
        }
        _ => false,
    }
}

fn classify(input: &str, field: Field, line: usize) -> SpecResult<MappingRule> {
    let invalid = || SpecParseError::InvalidInput {
        line,
        expression: input.to_string(),
    };

    if input == "-" || input.eq_ignore_ascii_case("ai") {
        return Ok(MappingRule::ai_inferred(field));
    }

    if input.contains('+') {
        let parts: Vec<String> = input.split('+').map(strip_annotations).collect();
        if parts.len() < 2 || !parts.iter().all(|p| is_field_name(p)) {
            return Err(invalid());
        }
        return Ok(MappingRule::combined(field, parts));
    }

    let name = strip_annotations(input);
    if !is_field_name(&name) {
        return Err(invalid());
    }
    Ok(MappingRule::direct(field, &name))
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('-') && name.chars().any(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::RuleKind;

    const SHEET: &str = "Input\tOutput\n\
        -\tID (a)\n\
        First (FP) + Last (FV)\tName (b)\n\
        Headline (FS)\tHeadline (d)\n\
        Country (B)\tcountry (R)\n\
        \n\
        City (A)\tcity (s)\n\
        AI\tNationality (Z)\n\
        -\tSubject (Array) (c)\n";

    #[test]
    fn test_parse_rule_kinds() {
        let spec = parse(SHEET).unwrap();
        assert_eq!(spec.len(), 7);

        let id = spec.rule_for(Field::TeacherId).unwrap();
        assert_eq!(id.kind, RuleKind::AiInferred);
        assert!(id.source_fields.is_empty());

        let name = spec.rule_for(Field::Name).unwrap();
        assert_eq!(name.kind, RuleKind::Combined);
        assert_eq!(name.source_fields, vec!["First", "Last"]);
        assert_eq!(name.combinator.as_ref().unwrap().separator, " ");
        assert_eq!(name.label, "Name");
        assert_eq!(name.line, 3);

        let country = spec.rule_for(Field::CurrentLocationCountry).unwrap();
        assert_eq!(country.kind, RuleKind::Direct);
        assert_eq!(country.source_fields, vec!["Country"]);

        let subject = spec.rule_for(Field::Subject).unwrap();
        assert_eq!(subject.label, "Subject");
    }

    #[test]
    fn test_rule_count_matches_data_lines_in_order() {
        let sheet = "Email E\tEmail (AC)\nID\tSource ID (AD)\norganization (U)\tSchool (AA)\n";
        let spec = parse(sheet).unwrap();
        let fields: Vec<Field> = spec.rules().iter().map(|r| r.output_field).collect();
        assert_eq!(fields, vec![Field::Email, Field::SourceId, Field::CurrentSchool]);
        assert_eq!(spec.rules()[0].source_fields, vec!["Email E"]);
    }

    #[test]
    fn test_pipe_table_with_markdown_rule() {
        let sheet = "| Input | Output |\n|---|---|\n| First + Last | Name |\n| - | Nationality |\n";
        let spec = parse(sheet).unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.rules()[0].kind, RuleKind::Combined);
        assert_eq!(spec.rules()[1].kind, RuleKind::AiInferred);
    }

    #[test]
    fn test_duplicate_output_is_fatal() {
        let sheet = "Country (B)\tcountry (R)\n-\tcurrent_location_country\n";
        let err = parse(sheet).unwrap_err();
        assert_eq!(
            err,
            SpecParseError::DuplicateOutput {
                line: 2,
                field: "current_location_country".into(),
                first_line: 1
            }
        );
    }

    #[test]
    fn test_line_without_pair() {
        let err = parse("Country (B)\tcountry\nJust one column\n").unwrap_err();
        assert!(matches!(err, SpecParseError::MissingColumns { line: 2, .. }));

        let err = parse("\tcountry\n").unwrap_err();
        assert!(matches!(err, SpecParseError::MissingColumns { line: 1, .. }));
    }

    #[test]
    fn test_invalid_input_expressions() {
        for bad in ["First +", "+ Last", "First + - ", "--", "(FP)"] {
            let sheet = format!("{}\tname\n", bad);
            let err = parse(&sheet).unwrap_err();
            assert!(
                matches!(err, SpecParseError::InvalidInput { line: 1, .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_unknown_output_and_empty_sheet() {
        let err = parse("Colour\tfavourite colour\n").unwrap_err();
        assert!(matches!(err, SpecParseError::UnknownOutputField { .. }));

        assert_eq!(parse("\n# only comments\n\n").unwrap_err(), SpecParseError::Empty);
    }

    #[test]
    fn test_strip_annotations() {
        assert_eq!(strip_annotations("First (FP)"), "First");
        assert_eq!(strip_annotations("Subject (Array) (c)"), "Subject");
        assert_eq!(strip_annotations("Email E"), "Email E");
        assert_eq!(strip_annotations("(FP)"), "");
    }

    #[test]
    fn test_parse_is_deterministic() {
        assert_eq!(parse(SHEET).unwrap(), parse(SHEET).unwrap());
    }
}
