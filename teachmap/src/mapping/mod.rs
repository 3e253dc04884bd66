//! Mapping specification for source-to-canonical field mapping.
//!
//! This module provides:
//! - `rule`: Rule and spec types (what a mapping sheet declares)
//! - `parser`: Text sheet to [`MappingSpec`]
//!
//! ## Usage Flow
//!
//! ```text
//! mapping sheet → parser::parse → MappingSpec → transform::engine → OutputRecord
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use teachmap::mapping::{parse, RuleKind};
//!
//! let spec = parse("First (FP) + Last (FV)\tName (b)\n-\tNationality (Z)\n")?;
//! assert_eq!(spec.rules()[0].kind, RuleKind::Combined);
//! ```

pub mod parser;
pub mod rule;

pub use parser::{parse, strip_annotations};
pub use rule::{Combinator, MappingRule, MappingSpec, RuleKind};
