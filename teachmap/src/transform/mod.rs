//! Transformation module.
//!
//! - Engine: applies mapping rules to one record, defers the rest to inference
//! - Normalize: per-type value coercion
//! - Identity: deterministic teacher ids
//! - Pipeline: the whole run, CSV in, validated records out

pub mod engine;
pub mod identity;
pub mod normalize;
pub mod pipeline;

pub use engine::{RecordDiagnostic, Resolution, RuleEngine};
pub use identity::synthesize_id;
pub use normalize::{coerce, count_subjects, is_placeholder, normalize_identifier};
pub use pipeline::*;
