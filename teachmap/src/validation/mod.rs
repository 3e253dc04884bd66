//! Content-contract validation for canonical teacher records.
//!
//! Validation is pure: it annotates a completed [`OutputRecord`] with a
//! per-field status and never changes or withholds it. Whether failing
//! records are emitted is decided by the run's
//! [`RetentionPolicy`](crate::config::RetentionPolicy).
//!
//! # Example
//!
//! ```rust,ignore
//! use teachmap::models::{Field, OutputRecord};
//! use teachmap::validation::{validate, ContentContract, FieldStatus};
//!
//! let mut record = OutputRecord::empty();
//! record.set(Field::TeacherId, "T-1234");
//!
//! let result = validate(&record, &ContentContract::teacher_profile());
//! assert_eq!(result.status(Field::TeacherId), FieldStatus::Malformed);
//! assert!(!result.passed);
//! ```

pub mod contract;

use serde::Serialize;
use std::collections::BTreeMap;

pub use contract::{ContentContract, FieldSpec, Predicate};

use crate::error::ValidationError;
use crate::inference::InferenceStats;
use crate::models::{Field, OutputRecord};

/// Outcome for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Valid,
    /// Empty. Only fails the record when the field is required.
    Missing,
    Malformed,
}

/// Per-field outcome of validating one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub statuses: BTreeMap<Field, FieldStatus>,
    pub errors: Vec<ValidationError>,
    pub passed: bool,
}

impl ValidationResult {
    pub fn status(&self, field: Field) -> FieldStatus {
        self.statuses
            .get(&field)
            .copied()
            .unwrap_or(FieldStatus::Missing)
    }
}

/// Check a completed record against the contract.
pub fn validate(record: &OutputRecord, contract: &ContentContract) -> ValidationResult {
    let mut statuses = BTreeMap::new();
    let mut errors = Vec::new();

    for spec in contract.fields() {
        let value = record.get(spec.field).trim();

        let status = if value.is_empty() {
            if spec.required {
                errors.push(ValidationError::MissingField {
                    field: spec.field.name().to_string(),
                });
            }
            FieldStatus::Missing
        } else {
            match spec.predicate {
                Some(predicate) if !predicate.check(value) => {
                    errors.push(ValidationError::Malformed {
                        field: spec.field.name().to_string(),
                        value: value.to_string(),
                        expected: predicate.expected().to_string(),
                    });
                    FieldStatus::Malformed
                }
                _ => FieldStatus::Valid,
            }
        };

        statuses.insert(spec.field, status);
    }

    ValidationResult {
        passed: errors.is_empty(),
        statuses,
        errors,
    }
}

/// Quick pass/fail check.
pub fn is_valid(record: &OutputRecord, contract: &ContentContract) -> bool {
    validate(record, contract).passed
}

// =============================================================================
// Run Summary
// =============================================================================

/// Status counts for one field across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldCounts {
    pub valid: usize,
    pub missing: usize,
    pub malformed: usize,
}

/// Run-level aggregate of every record's validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub records: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failing records withheld by the retention policy.
    pub dropped: usize,
    /// Keyed by field name, contract order.
    pub fields: BTreeMap<Field, FieldCounts>,
    pub inference: InferenceStats,
}

impl RunSummary {
    /// Fold one record's result into the summary.
    pub fn add(&mut self, result: &ValidationResult) {
        self.records += 1;
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }

        for (field, status) in &result.statuses {
            let counts = self.fields.entry(*field).or_default();
            match status {
                FieldStatus::Valid => counts.valid += 1,
                FieldStatus::Missing => counts.missing += 1,
                FieldStatus::Malformed => counts.malformed += 1,
            }
        }
    }

    /// Whether every record passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
