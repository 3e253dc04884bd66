//! Rule engine: applies a [`MappingSpec`] to one input record.
//!
//! Resolution is synchronous; only the inference step suspends. The result
//! of one record never depends on any other record.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{matches_context_column, RunConfig, ValueAliases};
use crate::error::FieldResolutionError;
use crate::inference::{Inferred, InferenceClient, InferenceContext};
use crate::mapping::{MappingSpec, RuleKind};
use crate::models::{Field, InputRecord, OutputRecord};

use super::identity::synthesize_id;
use super::normalize::{coerce, count_subjects, normalize_identifier};

/// Source column that carries an identifier even without a rule.
const ID_COLUMN: &str = "teacher_id";

/// Source column that carries a creation time even without a rule.
const CREATED_AT_COLUMN: &str = "created_at";

/// A non-fatal problem met while producing one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecordDiagnostic {
    /// A rule named a column this record does not have.
    #[serde(rename_all = "camelCase")]
    FieldResolution { field: String, source_column: String },
    /// Inference could not provide a value.
    InferenceUnresolved { field: String },
}

impl From<FieldResolutionError> for RecordDiagnostic {
    fn from(err: FieldResolutionError) -> Self {
        RecordDiagnostic::FieldResolution {
            field: err.field,
            source_column: err.source_column,
        }
    }
}

/// Candidate record plus what still needs inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub record: OutputRecord,
    /// Fields left for inference, rule order.
    pub deferred: Vec<Field>,
    pub diagnostics: Vec<RecordDiagnostic>,
}

/// Applies one mapping spec to records of one run.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    spec: Arc<MappingSpec>,
    aliases: ValueAliases,
    context_columns: Vec<String>,
    created_at: String,
}

impl RuleEngine {
    pub fn new(spec: Arc<MappingSpec>, config: &RunConfig) -> Self {
        Self {
            spec,
            aliases: config.aliases.clone(),
            context_columns: config.context_columns.clone(),
            created_at: config.created_at(),
        }
    }

    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    /// Produce the full record: resolve, infer what is deferred, merge.
    pub async fn transform(&self, input: &InputRecord, client: &InferenceClient) -> Resolution {
        let mut resolution = self.resolve(input);
        let answers = if resolution.deferred.is_empty() {
            BTreeMap::new()
        } else {
            let context = self.context_for(input, &resolution.record);
            client.infer_fields(&resolution.deferred, &context).await
        };
        self.merge(&mut resolution, answers);
        resolution
    }

    /// Apply every rule without inference.
    pub fn resolve(&self, input: &InputRecord) -> Resolution {
        let mut record = OutputRecord::empty();
        let mut deferred = Vec::new();
        let mut diagnostics = Vec::new();

        for rule in self.spec.rules() {
            let field = rule.output_field;
            match rule.kind {
                RuleKind::Direct => {
                    let source = &rule.source_fields[0];
                    match input.get(source) {
                        None => diagnostics.push(absent(field, source)),
                        Some(raw) => {
                            let value = coerce(field, raw, &self.aliases);
                            if value.is_empty() {
                                deferred.push(field);
                            } else {
                                record.set(field, value);
                            }
                        }
                    }
                }
                RuleKind::Combined => {
                    let mut present = Vec::with_capacity(rule.source_fields.len());
                    for source in &rule.source_fields {
                        match input.get(source) {
                            Some(raw) => present.push(raw),
                            None => diagnostics.push(absent(field, source)),
                        }
                    }
                    let joined = rule
                        .combinator
                        .clone()
                        .unwrap_or_default()
                        .join(present);
                    let value = coerce(field, &joined, &self.aliases);
                    if value.is_empty() {
                        deferred.push(field);
                    } else {
                        record.set(field, value);
                    }
                }
                RuleKind::AiInferred => deferred.push(field),
            }
        }

        self.assign_identity(input, &mut record);
        self.assign_created_at(input, &mut record);
        deferred.retain(|f| !f.is_system());

        Resolution {
            record,
            deferred,
            diagnostics,
        }
    }

    /// Context for inference: resolved fields, then free-text source columns.
    pub fn context_for(&self, input: &InputRecord, record: &OutputRecord) -> InferenceContext {
        let mut context = InferenceContext::new();
        for (field, value) in record.iter() {
            if !field.is_system() {
                context.insert(field.name(), value);
            }
        }
        for (column, value) in input.iter() {
            if matches_context_column(&self.context_columns, column) {
                context.insert(column, value);
            }
        }
        context
    }

    /// Coerce and store inferred answers, then derive dependent fields.
    pub fn merge(&self, resolution: &mut Resolution, answers: BTreeMap<Field, Inferred>) {
        for field in &resolution.deferred {
            let value = answers
                .get(field)
                .and_then(Inferred::value)
                .map(|v| coerce(*field, v, &self.aliases))
                .unwrap_or_default();

            if value.is_empty() {
                resolution.diagnostics.push(RecordDiagnostic::InferenceUnresolved {
                    field: field.name().to_string(),
                });
            } else {
                resolution.record.set(*field, value);
            }
        }

        if resolution.record.is_empty(Field::SubjectsCount) || !resolution.record.is_empty(Field::Subject) {
            let count = count_subjects(resolution.record.get(Field::Subject));
            resolution.record.set(Field::SubjectsCount, count.to_string());
        }
    }

    fn assign_identity(&self, input: &InputRecord, record: &mut OutputRecord) {
        let carried = if record.is_empty(Field::TeacherId) {
            input
                .get_ignore_case(ID_COLUMN)
                .filter(|v| !v.trim().is_empty())
                .map(normalize_identifier)
        } else {
            Some(record.get(Field::TeacherId).to_string())
        };
        let id = carried.unwrap_or_else(|| synthesize_id(input));
        record.set(Field::TeacherId, id);
    }

    fn assign_created_at(&self, input: &InputRecord, record: &mut OutputRecord) {
        if !record.is_empty(Field::CreatedAt) {
            return;
        }
        let from_source = input
            .get_ignore_case(CREATED_AT_COLUMN)
            .map(|v| coerce(Field::CreatedAt, v, &self.aliases))
            .filter(|v| !v.is_empty());
        record.set(Field::CreatedAt, from_source.unwrap_or_else(|| self.created_at.clone()));
    }
}

fn absent(field: Field, source: &str) -> RecordDiagnostic {
    FieldResolutionError {
        field: field.name().to_string(),
        source_column: source.to_string(),
    }
    .into()
}
