//! High-level pipeline API for CSV to teacher-profile transformation.
//!
//! Combines every step: mapping sheet parsing, CSV parsing, rule resolution,
//! inference, validation and retention.
//!
//! # Example
//!
//! ```rust,ignore
//! use teachmap::config::RunConfig;
//! use teachmap::inference::backend_for;
//! use teachmap::pipeline::transform_csv;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::from_env()?;
//!     let backend = backend_for(&config, false)?;
//!     let sheet = std::fs::read_to_string("mapping.tsv")?;
//!     let outcome = transform_csv(Path::new("teachers.csv"), &sheet, &config, backend).await?;
//!
//!     println!("{} of {} records passed", outcome.summary.passed, outcome.summary.records);
//!     Ok(())
//! }
//! ```

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::engine::{RecordDiagnostic, RuleEngine};
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::{RetentionPolicy, RunConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::inference::{InferenceBackend, InferenceClient};
use crate::mapping::{self, MappingSpec};
use crate::models::{InputRecord, OutputRecord};
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, ParseResult};
use crate::validation::{validate, ContentContract, RunSummary, ValidationResult};

/// Failing records echoed to the log before the rest are only counted.
const MAX_LOGGED_FAILURES: usize = 3;

/// CSV file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// One input row after transformation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Zero-based position in the input.
    pub index: usize,
    pub record: OutputRecord,
    pub diagnostics: Vec<RecordDiagnostic>,
    pub validation: ValidationResult,
    /// Whether the retention policy lets the record into the output.
    pub emitted: bool,
}

/// Result of a complete run, records in input order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub records: Vec<RecordOutcome>,
    pub summary: RunSummary,
    pub csv_info: CsvInfo,
}

/// Per-record entry of the JSON report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReport<'a> {
    pub index: usize,
    pub teacher_id: &'a str,
    pub passed: bool,
    pub emitted: bool,
    pub diagnostics: &'a [RecordDiagnostic],
    pub errors: &'a [crate::error::ValidationError],
}

/// Summary plus every record that carries a diagnostic or failed validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport<'a> {
    pub summary: &'a RunSummary,
    pub csv_info: &'a CsvInfo,
    pub records: Vec<RecordReport<'a>>,
}

impl RunOutcome {
    /// Records let through by the retention policy, input order.
    pub fn emitted(&self) -> Vec<OutputRecord> {
        self.records
            .iter()
            .filter(|r| r.emitted)
            .map(|r| r.record.clone())
            .collect()
    }

    pub fn report(&self) -> RunReport<'_> {
        RunReport {
            summary: &self.summary,
            csv_info: &self.csv_info,
            records: self
                .records
                .iter()
                .filter(|r| !r.diagnostics.is_empty() || !r.validation.passed)
                .map(|r| RecordReport {
                    index: r.index,
                    teacher_id: r.record.get(crate::models::Field::TeacherId),
                    passed: r.validation.passed,
                    emitted: r.emitted,
                    diagnostics: &r.diagnostics,
                    errors: &r.validation.errors,
                })
                .collect(),
        }
    }

    /// Pretty JSON report.
    pub fn report_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(&self.report())?)
    }
}

/// Transform a CSV file.
///
/// The mapping sheet is parsed first; a malformed sheet fails before the
/// CSV is even read.
pub async fn transform_csv(
    path: &Path,
    mapping_text: &str,
    config: &RunConfig,
    backend: Arc<dyn InferenceBackend>,
) -> PipelineResult<RunOutcome> {
    let spec = parse_mapping(mapping_text)?;
    log_info(format!("📖 Reading {}...", path.display()));
    let parse_result = parse_csv_file_auto(path)?;
    transform_parsed(parse_result, spec, config, backend).await
}

/// Same as [`transform_csv`] but accepts raw bytes instead of a file path.
pub async fn transform_bytes(
    bytes: &[u8],
    mapping_text: &str,
    config: &RunConfig,
    backend: Arc<dyn InferenceBackend>,
) -> PipelineResult<RunOutcome> {
    let spec = parse_mapping(mapping_text)?;
    log_info("📖 Reading uploaded CSV...");
    let parse_result = parse_bytes_auto(bytes)?;
    transform_parsed(parse_result, spec, config, backend).await
}

/// Transform already-parsed records with an already-parsed mapping.
pub async fn transform_records(
    records: Vec<InputRecord>,
    headers: Vec<String>,
    spec: Arc<MappingSpec>,
    config: &RunConfig,
    backend: Arc<dyn InferenceBackend>,
) -> PipelineResult<RunOutcome> {
    let parse_result = ParseResult {
        records,
        encoding: "utf-8".to_string(),
        delimiter: ',',
        headers,
    };
    transform_parsed(parse_result, spec, config, backend).await
}

fn parse_mapping(mapping_text: &str) -> PipelineResult<Arc<MappingSpec>> {
    match mapping::parse(mapping_text) {
        Ok(spec) => {
            log_success(format!("Mapping sheet: {} rules", spec.len()));
            Ok(Arc::new(spec))
        }
        Err(e) => {
            log_error(format!("Mapping sheet rejected: {}", e));
            Err(PipelineError::Spec(e))
        }
    }
}

async fn transform_parsed(
    parse_result: ParseResult,
    spec: Arc<MappingSpec>,
    config: &RunConfig,
    backend: Arc<dyn InferenceBackend>,
) -> PipelineResult<RunOutcome> {
    config.check()?;

    log_success(format!("Detected encoding: {}", parse_result.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parse_result.delimiter)));
    log_success(format!("Read {} rows", parse_result.records.len()));

    let csv_info = CsvInfo {
        encoding: parse_result.encoding.clone(),
        delimiter: parse_result.delimiter,
        headers: parse_result.headers.clone(),
        row_count: parse_result.records.len(),
    };

    if parse_result.records.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    if let Err(missing) = spec.validate_headers(&parse_result.headers) {
        log_warning(format!(
            "{} mapped column(s) not in the CSV: {}",
            missing.len(),
            missing.join(", ")
        ));
    }

    let engine = RuleEngine::new(spec, config);
    let client = InferenceClient::new(backend, config);
    log_info(format!(
        "🔄 Transforming with {} backend, {} in flight...",
        client.backend_name(),
        config.concurrency
    ));

    // `buffered` keeps input order whatever the completion order.
    let resolutions: Vec<_> = stream::iter(parse_result.records)
        .map(|input| {
            let engine = engine.clone();
            let client = client.clone();
            async move { engine.transform(&input, &client).await }
        })
        .buffered(config.concurrency)
        .collect()
        .await;

    log_info("✔️  Validating records...");
    let contract = ContentContract::teacher_profile();
    let mut summary = RunSummary::default();
    let mut records = Vec::with_capacity(resolutions.len());

    for (index, resolution) in resolutions.into_iter().enumerate() {
        let validation = validate(&resolution.record, &contract);
        summary.add(&validation);

        if !validation.passed && summary.failed <= MAX_LOGGED_FAILURES {
            let reasons: Vec<String> = validation.errors.iter().map(|e| e.to_string()).collect();
            log_error(format!("Record {}: {}", index, reasons.join(", ")));
        }

        let emitted = validation.passed || config.retention == RetentionPolicy::Keep;
        if !emitted {
            summary.dropped += 1;
        }

        records.push(RecordOutcome {
            index,
            record: resolution.record,
            diagnostics: resolution.diagnostics,
            validation,
            emitted,
        });
    }

    summary.inference = client.stats();

    if summary.failed > 0 {
        log_warning(format!("{} records failed validation", summary.failed));
    } else {
        log_success("All records valid!");
    }
    if summary.dropped > 0 {
        log_warning(format!("{} failing records dropped", summary.dropped));
    }
    log_success(format!(
        "Inference: {} lookups, {} cache hits, {} calls, {} unresolved",
        summary.inference.lookups,
        summary.inference.cache_hits,
        summary.inference.calls,
        summary.inference.unresolved
    ));

    Ok(RunOutcome {
        records,
        summary,
        csv_info,
    })
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}
