//! The canonical teacher-profile content contract.
//!
//! Which fields are required, and which format each present value must
//! satisfy.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::{Field, SemanticType};

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("url pattern"));

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("integer pattern"));

static PERCENTAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(?:\.\d+)?)\s*%?$").expect("percentage pattern"));

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));

/// Format rule for a present value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Hyphenated UUID.
    Uuid,
    /// Absolute http(s) URL.
    Url,
    /// One non-negative integer; ranges such as `5-10` fail.
    Integer,
    /// `YYYY-MM-DD`.
    IsoDate,
    /// RFC 3339 date-time, or ISO date-time without offset.
    IsoTimestamp,
    /// Number between 0 and 100, optional `%` suffix.
    Percentage,
    Email,
}

impl Predicate {
    pub fn check(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Predicate::Uuid => value.len() == 36 && uuid::Uuid::try_parse(value).is_ok(),
            Predicate::Url => URL.is_match(value),
            Predicate::Integer => INTEGER.is_match(value),
            Predicate::IsoDate => {
                value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
            }
            Predicate::IsoTimestamp => {
                DateTime::parse_from_rfc3339(value).is_ok()
                    || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            }
            Predicate::Percentage => PERCENTAGE
                .captures(value)
                .and_then(|c| c[1].parse::<f64>().ok())
                .is_some_and(|n| (0.0..=100.0).contains(&n)),
            Predicate::Email => EMAIL.is_match(value),
        }
    }

    /// Human name of the expected format, used in error messages.
    pub fn expected(self) -> &'static str {
        match self {
            Predicate::Uuid => "UUID",
            Predicate::Url => "URL",
            Predicate::Integer => "non-negative integer",
            Predicate::IsoDate => "ISO-8601 date",
            Predicate::IsoTimestamp => "ISO-8601 timestamp",
            Predicate::Percentage => "percentage",
            Predicate::Email => "email address",
        }
    }
}

/// Contract entry for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub field: Field,
    pub required: bool,
    pub semantic_type: SemanticType,
    pub predicate: Option<Predicate>,
}

/// The full set of field specs, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentContract {
    fields: Vec<FieldSpec>,
}

impl ContentContract {
    /// The canonical teacher-profile contract.
    pub fn teacher_profile() -> Self {
        let fields = Field::ALL
            .iter()
            .map(|&field| FieldSpec {
                field,
                required: is_required(field),
                semantic_type: field.semantic_type(),
                predicate: predicate_for(field),
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn spec(&self, field: Field) -> Option<&FieldSpec> {
        self.fields.iter().find(|s| s.field == field)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().filter(|s| s.required).map(|s| s.field)
    }
}

impl Default for ContentContract {
    fn default() -> Self {
        Self::teacher_profile()
    }
}

fn is_required(field: Field) -> bool {
    matches!(
        field,
        Field::TeacherId
            | Field::Name
            | Field::Subject
            | Field::Headline
            | Field::CurrentLocationCountry
            | Field::CurrentLocationCity
            | Field::LinkedinProfileUrl
            | Field::PreferredGradeLevel
            | Field::SubjectsCount
            | Field::CreatedAt
            | Field::Nationality
            | Field::SourceId
    )
}

fn predicate_for(field: Field) -> Option<Predicate> {
    match field {
        Field::TeacherId => Some(Predicate::Uuid),
        Field::ProfileCompletionPercentage => Some(Predicate::Percentage),
        Field::HourlyRate
        | Field::MonthlySalaryExpectation
        | Field::YearsOfTeachingExperience
        | Field::SubjectsCount => Some(Predicate::Integer),
        Field::AvailableStartDate => Some(Predicate::IsoDate),
        Field::CreatedAt => Some(Predicate::IsoTimestamp),
        Field::CvResumeUrl | Field::VideoIntroUrl | Field::LinkedinProfileUrl | Field::SchoolWebsite => {
            Some(Predicate::Url)
        }
        Field::Email => Some(Predicate::Email),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_shape() {
        let contract = ContentContract::teacher_profile();
        assert_eq!(contract.fields().len(), 30);
        assert_eq!(contract.required_fields().count(), 12);
        assert!(contract.spec(Field::TeacherId).unwrap().required);
        assert!(!contract.spec(Field::Email).unwrap().required);
    }

    #[test]
    fn test_integer_rejects_ranges() {
        assert!(Predicate::Integer.check("5"));
        assert!(Predicate::Integer.check(" 12 "));
        assert!(!Predicate::Integer.check("5-10"));
        assert!(!Predicate::Integer.check("five"));
        assert!(!Predicate::Integer.check("-3"));
    }

    #[test]
    fn test_uuid_and_url() {
        assert!(Predicate::Uuid.check("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!Predicate::Uuid.check("67e5504410b1426f9247bb680e5fe0c8"));
        assert!(!Predicate::Uuid.check("T-1234"));

        assert!(Predicate::Url.check("https://www.linkedin.com/in/jane"));
        assert!(Predicate::Url.check("HTTP://example.org"));
        assert!(!Predicate::Url.check("www.linkedin.com/in/jane"));
        assert!(!Predicate::Url.check("https://"));
    }

    #[test]
    fn test_dates_and_timestamps() {
        assert!(Predicate::IsoDate.check("2024-09-01"));
        assert!(!Predicate::IsoDate.check("01/09/2024"));
        assert!(!Predicate::IsoDate.check("2024-13-01"));

        assert!(Predicate::IsoTimestamp.check("2024-03-01T10:00:00Z"));
        assert!(Predicate::IsoTimestamp.check("2024-03-01T10:00:00+04:00"));
        assert!(Predicate::IsoTimestamp.check("2024-03-01T10:00:00"));
        assert!(!Predicate::IsoTimestamp.check("2024-03-01"));
    }

    #[test]
    fn test_percentage_and_email() {
        assert!(Predicate::Percentage.check("85%"));
        assert!(Predicate::Percentage.check("100"));
        assert!(Predicate::Percentage.check("42.5 %"));
        assert!(!Predicate::Percentage.check("120%"));
        assert!(!Predicate::Percentage.check("high"));

        assert!(Predicate::Email.check("jane@school.ae"));
        assert!(!Predicate::Email.check("jane@school"));
        assert!(!Predicate::Email.check("jane school@x.ae"));
    }
}
