//! # teachmap - Rule-driven teacher profile transformation
//!
//! teachmap maps raw teacher exports (CSV, any column naming) onto the
//! canonical teacher-profile schema, following a two-column mapping sheet.
//! Fields the source cannot provide are inferred by a language model, and
//! every record is checked against the content contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│   Parser    │────▶│ Rule Engine │────▶│  Validator  │
//! │ (ISO/UTF8)  │     │  (auto-enc) │     │ (+ AI infer)│     │ (contract)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲
//!                     mapping sheet
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use teachmap::{transform_csv, backend_for, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::from_env()?;
//!     let backend = backend_for(&config, false)?;
//!     let sheet = std::fs::read_to_string("mapping.tsv")?;
//!     let outcome = transform_csv("teachers.csv".as_ref(), &sheet, &config, backend).await?;
//!     println!("{} records, {} passed", outcome.summary.records, outcome.summary.passed);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Canonical fields and records
//! - [`config`] - Run configuration, retry policy, value aliases
//! - [`mapping`] - Mapping sheet parsing
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Rule engine, coercion and pipeline
//! - [`validation`] - Content contract validation
//! - [`cache`] - Single-flight inference cache
//! - [`inference`] - Inference client and backends
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Mapping sheets
pub mod mapping;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Caching
pub mod cache;

// Inference
pub mod inference;

// HTTP API
pub mod api;

pub use transform::pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    CsvError,
    FieldResolutionError,
    InferenceError,
    PipelineError,
    PipelineResult,
    ServerError,
    SpecParseError,
    ValidationError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use models::{Field, InputRecord, OutputRecord, SemanticType};

pub use config::{RetentionPolicy, RetryPolicy, RunConfig, ValueAliases};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use mapping::{parse as parse_mapping, MappingRule, MappingSpec, RuleKind};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    parse_bytes_auto,
    parse_csv_file_auto,
    write_output_csv,
    ParseResult,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, validate, ContentContract, FieldStatus, RunSummary, ValidationResult};

// =============================================================================
// Re-exports - Inference
// =============================================================================

pub use inference::{
    backend_for,
    InferenceBackend,
    InferenceClient,
    InferenceContext,
    Inferred,
    OfflineBackend,
    OpenAiBackend,
};

pub use cache::InferenceCache;

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{RecordDiagnostic, RuleEngine};

pub use transform::pipeline::{
    transform_bytes,
    transform_csv,
    transform_records,
    CsvInfo,
    RecordOutcome,
    RunOutcome,
};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
