//! REST API types for the transformation endpoint.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::inference::InferenceStats;
use crate::models::OutputRecord;
use crate::transform::pipeline::RunOutcome;

/// Response sent after CSV upload and transformation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning", "error"
    pub status: String,

    /// Emitted canonical records, input order
    pub teachers: Vec<OutputRecord>,

    pub metadata: ResponseMetadata,
}

/// Metadata about the transformation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub total_records: usize,
    pub csv_info: CsvMetadata,
    pub validation: ValidationStats,
    pub inference: InferenceStats,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Validation statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub passed: usize,
    pub failed: usize,
    pub dropped: usize,
    pub errors: Vec<RecordErrors>,
}

/// Contract violations of one record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordErrors {
    pub record_index: usize,
    pub errors: Vec<String>,
}

impl From<RunOutcome> for TransformResponse {
    fn from(outcome: RunOutcome) -> Self {
        let teachers = outcome.emitted();
        let summary = outcome.summary;

        let errors = outcome
            .records
            .iter()
            .filter(|r| !r.validation.passed)
            .map(|r| RecordErrors {
                record_index: r.index,
                errors: r.validation.errors.iter().map(|e| e.to_string()).collect(),
            })
            .collect();

        TransformResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if summary.failed == 0 { "ready" } else { "warning" }.to_string(),
            teachers,
            metadata: ResponseMetadata {
                total_records: summary.records,
                csv_info: CsvMetadata {
                    encoding: outcome.csv_info.encoding,
                    delimiter: outcome.csv_info.delimiter.to_string(),
                    row_count: outcome.csv_info.row_count,
                    columns: outcome.csv_info.headers,
                },
                validation: ValidationStats {
                    passed: summary.passed,
                    failed: summary.failed,
                    dropped: summary.dropped,
                    errors,
                },
                inference: summary.inference,
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "teachers": [],
        "metadata": {
            "totalRecords": 0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let body = error_response("line 3: unknown output field 'colour'");
        assert_eq!(body["status"], "error");
        assert_eq!(body["teachers"], json!([]));
        assert!(body["error"].as_str().unwrap().contains("colour"));
    }
}
