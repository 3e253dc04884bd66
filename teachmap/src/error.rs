//! Error types for the teachmap transformation pipeline.
//!
//! - [`CsvError`] - CSV reading/writing errors
//! - [`SpecParseError`] - Malformed mapping specification (fatal)
//! - [`FieldResolutionError`] - A rule references a source column the record lacks
//! - [`InferenceError`] - Inference service failures (retried, then degraded)
//! - [`ValidationError`] - A completed field breaks the content contract
//! - [`ConfigError`] - Invalid run configuration
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Only [`SpecParseError`] (and the I/O errors around it) ends a run. The
//! per-record kinds are collected as diagnostics on the record instead.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading or writing delimited files.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read or write a file.
    #[error("Failed to access file: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid CSV content.
    #[error("Invalid CSV at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Writer failure.
    #[error("Failed to write CSV: {0}")]
    WriteError(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::ParseError {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Mapping Specification Errors
// =============================================================================

/// A malformed mapping specification. Always fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecParseError {
    /// A data line could not be split into an input and an output column.
    #[error("line {line}: expected '<input>\\t<output>' or '<input> | <output>', got '{text}'")]
    MissingColumns { line: usize, text: String },

    /// The input column is not `-`, a field name or a `+`-joined list.
    #[error("line {line}: invalid input expression '{expression}'")]
    InvalidInput { line: usize, expression: String },

    /// The output column does not name a content-contract field.
    #[error("line {line}: unknown output field '{field}'")]
    UnknownOutputField { line: usize, field: String },

    /// The same output field is declared by two rules.
    #[error("line {line}: output field '{field}' already declared on line {first_line}")]
    DuplicateOutput {
        line: usize,
        field: String,
        first_line: usize,
    },

    /// No data line at all.
    #[error("mapping specification contains no rules")]
    Empty,
}

// =============================================================================
// Field Resolution Errors
// =============================================================================

/// A `Direct` or `Combined` rule referenced a column absent from the record.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("field '{field}': source column '{source_column}' is absent")]
#[serde(rename_all = "camelCase")]
pub struct FieldResolutionError {
    pub field: String,
    pub source_column: String,
}

// =============================================================================
// Inference Errors
// =============================================================================

/// Errors from the inference service boundary.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// Missing API key.
    #[error("Missing OPENAI_API_KEY environment variable")]
    MissingApiKey,

    /// The attempt did not complete in time.
    #[error("Inference attempt timed out")]
    Timeout,

    /// Rate limited by the service.
    #[error("Rate limited (retry after {0:?} seconds)")]
    RateLimited(Option<u64>),

    /// Transport failure before a response arrived.
    #[error("HTTP request failed: {0}")]
    Network(String),

    /// Non-success status from the service.
    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response could not be interpreted.
    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),
}

impl InferenceError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Timeout
            | InferenceError::RateLimited(_)
            | InferenceError::Network(_) => true,
            InferenceError::Status { status, .. } => *status >= 500,
            InferenceError::MissingApiKey | InferenceError::InvalidResponse(_) => false,
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A content-contract violation on one field of a completed record.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationError {
    /// Required field is absent or empty.
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Present value fails the field's format predicate.
    #[error("Invalid value for field '{field}': '{value}' is not a valid {expected}")]
    Malformed {
        field: String,
        value: String,
        expected: String,
    },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unparsable value.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },

    /// A configured value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The alias file could not be read.
    #[error("Failed to read alias file: {0}")]
    AliasFile(#[from] std::io::Error),

    /// The alias file is not valid JSON.
    #[error("Invalid alias file: {0}")]
    AliasJson(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level run errors.
///
/// Returned by [`crate::transform::pipeline::transform_csv`] and friends.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Fatal mapping specification error.
    #[error("Mapping specification error: {0}")]
    Spec(#[from] SpecParseError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inference backend could not be constructed.
    #[error("Inference setup error: {0}")]
    Inference(#[from] InferenceError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No records to transform.
    #[error("No records to transform")]
    EmptyInput,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Bind/serve failure.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for mapping specification parsing.
pub type SpecResult<T> = Result<T, SpecParseError>;

/// Result type for inference backend calls.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
