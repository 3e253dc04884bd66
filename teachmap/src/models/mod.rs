//! Domain models for the teachmap transformation pipeline.
//!
//! - [`Field`] - The closed set of canonical teacher-profile fields
//! - [`SemanticType`] - How a field's raw value is coerced
//! - [`InputRecord`] - One raw source row (column name -> raw string)
//! - [`OutputRecord`] - One canonical row, always holding every [`Field`]

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Canonical Fields
// =============================================================================

/// A canonical output field.
///
/// Declaration order is the emission order of the content contract, and the
/// derived `Ord` follows it, so ordered maps keyed by `Field` iterate in
/// contract order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    TeacherId,
    Name,
    Subject,
    Headline,
    Bio,
    ProfileCompletionPercentage,
    ProfileVisibility,
    PreferredTeachingModes,
    WillingToRelocate,
    HourlyRate,
    MonthlySalaryExpectation,
    AvailableStartDate,
    CvResumeUrl,
    VideoIntroUrl,
    PreferredCurriculumExperience,
    YearsOfTeachingExperience,
    WorkAuthorizationStatus,
    CurrentLocationCountry,
    CurrentLocationCity,
    BackgroundCheckStatus,
    LinkedinProfileUrl,
    PreferredGradeLevel,
    SubjectsCount,
    CreatedAt,
    Embeddings,
    Nationality,
    CurrentSchool,
    SchoolWebsite,
    Email,
    SourceId,
}

/// How raw values for a field are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// Record identity (UUID).
    Identifier,
    /// Free or short text.
    Text,
    /// A single integer.
    Number,
    /// Calendar date, emitted as `YYYY-MM-DD`.
    Date,
    /// ISO-8601 date-time.
    Timestamp,
    /// Web address, passed through untouched.
    Url,
    /// Email address, passed through untouched.
    Email,
}

impl Field {
    /// Every field, in contract order.
    pub const ALL: [Field; 30] = [
        Field::TeacherId,
        Field::Name,
        Field::Subject,
        Field::Headline,
        Field::Bio,
        Field::ProfileCompletionPercentage,
        Field::ProfileVisibility,
        Field::PreferredTeachingModes,
        Field::WillingToRelocate,
        Field::HourlyRate,
        Field::MonthlySalaryExpectation,
        Field::AvailableStartDate,
        Field::CvResumeUrl,
        Field::VideoIntroUrl,
        Field::PreferredCurriculumExperience,
        Field::YearsOfTeachingExperience,
        Field::WorkAuthorizationStatus,
        Field::CurrentLocationCountry,
        Field::CurrentLocationCity,
        Field::BackgroundCheckStatus,
        Field::LinkedinProfileUrl,
        Field::PreferredGradeLevel,
        Field::SubjectsCount,
        Field::CreatedAt,
        Field::Embeddings,
        Field::Nationality,
        Field::CurrentSchool,
        Field::SchoolWebsite,
        Field::Email,
        Field::SourceId,
    ];

    /// Column header used in the canonical dataset.
    pub fn name(self) -> &'static str {
        match self {
            Field::TeacherId => "teacher_id",
            Field::Name => "name",
            Field::Subject => "subject",
            Field::Headline => "headline",
            Field::Bio => "bio",
            Field::ProfileCompletionPercentage => "profile_completion_percentage",
            Field::ProfileVisibility => "profile_visibility",
            Field::PreferredTeachingModes => "preferred_teaching_modes",
            Field::WillingToRelocate => "willing_to_relocate",
            Field::HourlyRate => "hourly_rate",
            Field::MonthlySalaryExpectation => "monthly_salary_expectation",
            Field::AvailableStartDate => "available_start_date",
            Field::CvResumeUrl => "cv_resume_url",
            Field::VideoIntroUrl => "video_intro_url",
            Field::PreferredCurriculumExperience => "preferred_curriculum_experience",
            Field::YearsOfTeachingExperience => "years_of_teaching_experience",
            Field::WorkAuthorizationStatus => "work_authorization_status",
            Field::CurrentLocationCountry => "current_location_country",
            Field::CurrentLocationCity => "current_location_city",
            Field::BackgroundCheckStatus => "background_check_status",
            Field::LinkedinProfileUrl => "linkedin_profile_url",
            Field::PreferredGradeLevel => "preferred_grade_level",
            Field::SubjectsCount => "subjects_count",
            Field::CreatedAt => "created_at",
            Field::Embeddings => "Embeddings",
            Field::Nationality => "Nationality",
            Field::CurrentSchool => "Current school",
            Field::SchoolWebsite => "School website",
            Field::Email => "Email",
            Field::SourceId => "Source ID",
        }
    }

    /// Labels used by source-side mapping sheets for this field.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::TeacherId => &["id", "teacher id"],
            Field::Name => &["full name", "teacher name"],
            Field::Subject => &["subjects", "subject array"],
            Field::Bio => &["biography", "summary", "about"],
            Field::PreferredCurriculumExperience => &[
                "preferred curriculum",
                "preferred curriculumn",
                "curriculum",
            ],
            Field::YearsOfTeachingExperience => &["years of experience", "experience years"],
            Field::CurrentLocationCountry => &["country", "location country"],
            Field::CurrentLocationCity => &["city", "location city"],
            Field::LinkedinProfileUrl => &["linkedin url", "linkedin", "profile url"],
            Field::PreferredGradeLevel => &["preferred age range", "grade level", "age range"],
            Field::CurrentSchool => &["school", "organization", "organisation"],
            Field::SchoolWebsite => &["school url", "organization website"],
            Field::Email => &["email address", "e-mail"],
            _ => &[],
        }
    }

    /// Resolve a spec label (canonical name or known alias) to a field.
    ///
    /// Matching ignores case, `_`/`-` versus space, and repeated whitespace.
    pub fn from_label(label: &str) -> Option<Field> {
        let wanted = normalize_label(label);
        if wanted.is_empty() {
            return None;
        }
        Field::ALL
            .iter()
            .copied()
            .find(|f| normalize_label(f.name()) == wanted)
            .or_else(|| {
                Field::ALL.iter().copied().find(|f| {
                    f.aliases().iter().any(|a| normalize_label(a) == wanted)
                })
            })
    }

    pub fn semantic_type(self) -> SemanticType {
        match self {
            Field::TeacherId => SemanticType::Identifier,
            Field::ProfileCompletionPercentage
            | Field::HourlyRate
            | Field::MonthlySalaryExpectation
            | Field::YearsOfTeachingExperience
            | Field::SubjectsCount => SemanticType::Number,
            Field::AvailableStartDate => SemanticType::Date,
            Field::CreatedAt => SemanticType::Timestamp,
            Field::CvResumeUrl
            | Field::VideoIntroUrl
            | Field::LinkedinProfileUrl
            | Field::SchoolWebsite => SemanticType::Url,
            Field::Email => SemanticType::Email,
            _ => SemanticType::Text,
        }
    }

    /// Fields computed by the engine itself; never sent to inference.
    pub fn is_system(self) -> bool {
        matches!(self, Field::TeacherId | Field::CreatedAt | Field::SubjectsCount)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Records
// =============================================================================

/// One raw source row.
///
/// Columns are kept sorted by name so anything derived from "all columns"
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InputRecord {
    columns: BTreeMap<String, String>,
}

impl InputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Raw value, `None` when the column is absent from this row.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// Raw value looked up ignoring case.
    pub fn get_ignore_case(&self, column: &str) -> Option<&str> {
        self.get(column).or_else(|| {
            self.columns
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(column))
                .map(|(_, v)| v.as_str())
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InputRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One canonical row. Holds every [`Field`]; unresolved ones are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    values: BTreeMap<Field, String>,
}

impl OutputRecord {
    /// A record with every contract field present and empty.
    pub fn empty() -> Self {
        Self {
            values: Field::ALL.iter().map(|f| (*f, String::new())).collect(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn is_empty(&self, field: Field) -> bool {
        self.get(field).trim().is_empty()
    }

    /// Fields and values in contract order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.values.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// Values in contract order, ready for a CSV row.
    pub fn to_row(&self) -> Vec<&str> {
        self.values.values().map(String::as_str).collect()
    }

    /// Header row matching [`OutputRecord::to_row`].
    pub fn headers() -> Vec<&'static str> {
        Field::ALL.iter().map(|f| f.name()).collect()
    }
}

impl Default for OutputRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for OutputRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_canonical_and_alias() {
        assert_eq!(Field::from_label("teacher_id"), Some(Field::TeacherId));
        assert_eq!(Field::from_label("country"), Some(Field::CurrentLocationCountry));
        assert_eq!(Field::from_label("Linkedin URL"), Some(Field::LinkedinProfileUrl));
        assert_eq!(Field::from_label("Preferred curriculumn"), Some(Field::PreferredCurriculumExperience));
        assert_eq!(Field::from_label("source id"), Some(Field::SourceId));
        assert_eq!(Field::from_label("CURRENT   SCHOOL"), Some(Field::CurrentSchool));
        assert_eq!(Field::from_label("favourite colour"), None);
    }

    #[test]
    fn test_all_fields_unique_names() {
        let mut names: Vec<_> = Field::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Field::ALL.len());
    }

    #[test]
    fn test_output_record_contract_order() {
        let mut record = OutputRecord::empty();
        record.set(Field::SourceId, "42");
        record.set(Field::TeacherId, "x");

        let headers = OutputRecord::headers();
        assert_eq!(headers.first(), Some(&"teacher_id"));
        assert_eq!(headers.last(), Some(&"Source ID"));

        let row = record.to_row();
        assert_eq!(row.len(), 30);
        assert_eq!(row[0], "x");
        assert_eq!(row[29], "42");
    }

    #[test]
    fn test_input_record_case_insensitive_lookup() {
        let record: InputRecord = [("Email", "a@b.co")].into_iter().collect();
        assert_eq!(record.get("email"), None);
        assert_eq!(record.get_ignore_case("email"), Some("a@b.co"));
    }
}
