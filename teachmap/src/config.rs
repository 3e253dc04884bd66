//! Run configuration.
//!
//! One immutable [`RunConfig`] is built at start-up (environment, then CLI
//! overrides) and passed explicitly to the pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::Field;

/// Default inference model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Default inference service base URL.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Records in flight, and outbound calls in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Attempts per inference call, first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt.
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Multiplier applied to the delay after every failed attempt.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Upper bound on any single retry delay, `Retry-After` hints included.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Timeout of a single attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Input column prefixes forwarded to inference as free-text context.
pub const DEFAULT_CONTEXT_COLUMNS: &[&str] = &[
    "headline",
    "summary",
    "bio",
    "about",
    "description",
    "title",
    "organization",
    "departments",
    "functions",
    "employment_history",
    "city",
    "state",
    "country",
];

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded exponential backoff for inference calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based),
    /// saturating at [`MAX_BACKOFF`].
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }
}

// =============================================================================
// Retention Policy
// =============================================================================

/// What the pipeline does with records that fail validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Emit every record; failures are flagged in the report.
    #[default]
    Keep,
    /// Withhold records that did not pass.
    DropFailing,
}

// =============================================================================
// Value Aliases
// =============================================================================

/// Per-field table of raw value spellings to canonical values.
///
/// Lookups ignore case and surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueAliases {
    table: HashMap<Field, HashMap<String, String>>,
}

impl ValueAliases {
    /// A table with no entries.
    pub fn none() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn insert(&mut self, field: Field, raw: &str, canonical: &str) {
        self.table
            .entry(field)
            .or_default()
            .insert(raw.trim().to_lowercase(), canonical.to_string());
    }

    /// Canonical spelling of `value` for `field`, if it has one.
    pub fn resolve(&self, field: Field, value: &str) -> Option<&str> {
        self.table
            .get(&field)?
            .get(&value.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Merge entries from a JSON file shaped `{"field": {"raw": "canonical"}}`.
    ///
    /// Field keys accept the same labels as the mapping sheet.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.merge_json(&content)
    }

    pub fn merge_json(&mut self, content: &str) -> Result<(), ConfigError> {
        let parsed: HashMap<String, HashMap<String, String>> = serde_json::from_str(content)?;
        for (label, entries) in parsed {
            let field = Field::from_label(&label)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown alias field '{}'", label)))?;
            for (raw, canonical) in entries {
                self.insert(field, &raw, &canonical);
            }
        }
        Ok(())
    }
}

impl Default for ValueAliases {
    fn default() -> Self {
        let mut aliases = Self::none();
        for (raw, canonical) in [
            ("UAE", "United Arab Emirates"),
            ("U.A.E.", "United Arab Emirates"),
            ("UK", "United Kingdom"),
            ("U.K.", "United Kingdom"),
            ("Great Britain", "United Kingdom"),
            ("USA", "United States"),
            ("US", "United States"),
            ("U.S.", "United States"),
            ("U.S.A.", "United States"),
            ("United States of America", "United States"),
            ("KSA", "Saudi Arabia"),
        ] {
            aliases.insert(Field::CurrentLocationCountry, raw, canonical);
        }
        aliases
    }
}

// =============================================================================
// Run Configuration
// =============================================================================

/// Everything a run needs besides its input and mapping sheet.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Inference service key; `None` means only an offline run is possible.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub aliases: ValueAliases,
    /// Lowercase prefixes of input columns used as inference context.
    pub context_columns: Vec<String>,
    /// Fixed once per run; fills `created_at` when the source has none.
    pub run_timestamp: DateTime<Utc>,
    pub retention: RetentionPolicy,
}

impl RunConfig {
    /// Build from process environment (after loading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryPolicy::default();
        let config = Self {
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: lookup("TEACHMAP_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: lookup("TEACHMAP_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            concurrency: parse_var(&lookup, "TEACHMAP_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            retry: RetryPolicy {
                max_attempts: parse_var(&lookup, "TEACHMAP_MAX_ATTEMPTS", defaults.max_attempts)?,
                initial_backoff: Duration::from_millis(parse_var(
                    &lookup,
                    "TEACHMAP_BACKOFF_MS",
                    DEFAULT_BACKOFF_MS,
                )?),
                backoff_factor: parse_var(&lookup, "TEACHMAP_BACKOFF_FACTOR", defaults.backoff_factor)?,
                attempt_timeout: Duration::from_secs(parse_var(
                    &lookup,
                    "TEACHMAP_ATTEMPT_TIMEOUT_SECS",
                    DEFAULT_ATTEMPT_TIMEOUT_SECS,
                )?),
            },
            ..Self::default()
        };
        config.check()?;
        Ok(config)
    }

    /// Reject values no run can work with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("max attempts must be at least 1".into()));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid("backoff factor must be a finite number >= 1".into()));
        }
        Ok(())
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_run_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.run_timestamp = timestamp;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_aliases(mut self, aliases: ValueAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Run timestamp as written into `created_at`.
    pub fn created_at(&self) -> String {
        self.run_timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Whether an input column is forwarded as inference context.
    pub fn is_context_column(&self, column: &str) -> bool {
        matches_context_column(&self.context_columns, column)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            aliases: ValueAliases::default(),
            context_columns: DEFAULT_CONTEXT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            run_timestamp: run_timestamp_now(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Whether `column` starts with one of the lowercase `prefixes`, ignoring case.
pub fn matches_context_column(prefixes: &[String], column: &str) -> bool {
    let column = column.trim().to_lowercase();
    prefixes.iter().any(|p| column.starts_with(p.as_str()))
}

/// The current time truncated to whole seconds.
pub fn run_timestamp_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// Parse a timestamp given on the command line (RFC 3339).
pub fn parse_run_timestamp(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ConfigError::InvalidEnv {
            name: "created-at".to_string(),
            value: value.to_string(),
        })
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        }),
    }
}
