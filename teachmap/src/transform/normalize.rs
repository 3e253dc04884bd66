//! Value coercion by semantic type.
//!
//! Every value written into an [`OutputRecord`](crate::models::OutputRecord),
//! whether it came from the source row or from inference, goes through
//! [`coerce`]. An empty result means "not resolved".

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ValueAliases;
use crate::models::{Field, SemanticType};

static THOUSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d),(\d{3})\b").expect("thousands pattern"));

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-\s*)?(\d+)(?:\.(\d+))?").expect("number pattern"));

/// Date layouts accepted from sources, tried in order. Day-first wins for
/// ambiguous slash dates.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Answers inference gives when it has nothing to say.
const PLACEHOLDERS: &[&str] = &["unknown", "not specified", "n/a", "na", "none", "null", "-"];

/// Coerce a raw value to the canonical form of `field`.
pub fn coerce(field: Field, raw: &str, aliases: &ValueAliases) -> String {
    match field.semantic_type() {
        SemanticType::Text => coerce_text(field, raw, aliases),
        SemanticType::Number => coerce_number(field, raw),
        SemanticType::Date => coerce_date(raw),
        SemanticType::Timestamp => coerce_timestamp(raw),
        SemanticType::Identifier => normalize_identifier(raw),
        SemanticType::Url | SemanticType::Email => raw.trim().to_string(),
    }
}

/// Whether an inferred answer means "unknown".
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value.is_empty() || PLACEHOLDERS.contains(&value.as_str())
}

/// Trim; UUIDs in any accepted layout become lowercase hyphenated.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    match uuid::Uuid::try_parse(trimmed) {
        Ok(id) => id.hyphenated().to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Number of comma-separated, non-empty subjects.
pub fn count_subjects(subject: &str) -> usize {
    subject.split(',').filter(|s| !s.trim().is_empty()).count()
}

fn coerce_text(field: Field, raw: &str, aliases: &ValueAliases) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match aliases.resolve(field, &collapsed) {
        Some(canonical) => canonical.to_string(),
        None => collapsed,
    }
}

/// First number in the value; for a range that is the lower bound.
/// A leading minus sign survives.
///
/// Percentages keep their decimals, other numeric fields keep the integer part.
fn coerce_number(field: Field, raw: &str) -> String {
    let mut cleaned = raw.to_string();
    // Matches cannot overlap, so "1,000,000" needs two passes.
    while THOUSANDS.is_match(&cleaned) {
        cleaned = THOUSANDS.replace_all(&cleaned, "$1$2").into_owned();
    }
    let Some(caps) = NUMBER.captures(&cleaned) else {
        return String::new();
    };

    let whole = caps[2].trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };
    // Negative values stay negative and fail the contract.
    let sign = if caps.get(1).is_some() && whole != "0" { "-" } else { "" };

    match (field, caps.get(3)) {
        (Field::ProfileCompletionPercentage, Some(frac)) => format!("{}{}.{}", sign, whole, frac.as_str()),
        _ => format!("{}{}", sign, whole),
    }
}

fn coerce_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match parse_date(trimmed) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => trimmed.to_string(),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    {
        return Some(date);
    }
    // "September 2024" -> first of the month.
    ["%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&format!("1 {}", value), fmt).ok())
}

fn coerce_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Some(naive) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    {
        return naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Some(midnight) = parse_date(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0)) {
        return DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> ValueAliases {
        ValueAliases::default()
    }

    #[test]
    fn test_text_collapses_and_aliases() {
        assert_eq!(
            coerce(Field::CurrentLocationCountry, "UAE", &aliases()),
            "United Arab Emirates"
        );
        assert_eq!(
            coerce(Field::Headline, "  Maths   teacher \n at  GEMS ", &aliases()),
            "Maths teacher at GEMS"
        );
        assert_eq!(coerce(Field::Headline, "   ", &aliases()), "");
    }

    #[test]
    fn test_number_ranges_take_lower_bound() {
        let f = Field::YearsOfTeachingExperience;
        for raw in ["5-10", "5 - 10", "5–10", "5 to 10", "5"] {
            assert_eq!(coerce(f, raw, &aliases()), "5", "{raw}");
        }
        assert_eq!(coerce(f, "10+ years", &aliases()), "10");
        assert_eq!(coerce(f, "about 7.5 years", &aliases()), "7");
        assert_eq!(coerce(f, "many", &aliases()), "");
    }

    #[test]
    fn test_number_variants() {
        assert_eq!(coerce(Field::MonthlySalaryExpectation, "AED 12,500", &aliases()), "12500");
        assert_eq!(coerce(Field::MonthlySalaryExpectation, "1,200,000", &aliases()), "1200000");
        assert_eq!(coerce(Field::ProfileCompletionPercentage, "42.5%", &aliases()), "42.5");
        assert_eq!(coerce(Field::HourlyRate, "007", &aliases()), "7");
        assert_eq!(coerce(Field::YearsOfTeachingExperience, "-3", &aliases()), "-3");
    }

    #[test]
    fn test_dates() {
        let f = Field::AvailableStartDate;
        assert_eq!(coerce(f, "2024-09-01", &aliases()), "2024-09-01");
        assert_eq!(coerce(f, "01/09/2024", &aliases()), "2024-09-01");
        assert_eq!(coerce(f, "September 1, 2024", &aliases()), "2024-09-01");
        assert_eq!(coerce(f, "September 2024", &aliases()), "2024-09-01");
        assert_eq!(coerce(f, "soon", &aliases()), "soon");
    }

    #[test]
    fn test_timestamps() {
        let f = Field::CreatedAt;
        assert_eq!(coerce(f, "2024-03-01T10:00:00Z", &aliases()), "2024-03-01T10:00:00Z");
        assert_eq!(coerce(f, "2024-03-01 10:00:00", &aliases()), "2024-03-01T10:00:00Z");
        assert_eq!(coerce(f, "2024-03-01", &aliases()), "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_identifier_and_url() {
        assert_eq!(
            normalize_identifier(" 67E55044-10B1-426F-9247-BB680E5FE0C8 "),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
        assert_eq!(
            normalize_identifier("67e5504410b1426f9247bb680e5fe0c8"),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
        assert_eq!(normalize_identifier("T-1234"), "T-1234");
        assert_eq!(
            coerce(Field::LinkedinProfileUrl, "linkedin.com/in/Jane", &aliases()),
            "linkedin.com/in/Jane"
        );
    }

    #[test]
    fn test_placeholders_and_subjects() {
        assert!(is_placeholder("Unknown"));
        assert!(is_placeholder(" Not Specified "));
        assert!(!is_placeholder("Dubai"));

        assert_eq!(count_subjects("Mathematics, Physics"), 2);
        assert_eq!(count_subjects("Mathematics,, "), 1);
        assert_eq!(count_subjects(""), 0);
    }
}
