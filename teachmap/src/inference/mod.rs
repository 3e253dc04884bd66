//! Inference boundary for fields the source data cannot provide.
//!
//! - [`InferenceBackend`] - One call to an external service (OpenAI, offline, test doubles)
//! - [`InferenceClient`] - Batching, caching, retry and concurrency limits around a backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use teachmap::inference::{InferenceClient, InferenceContext, OpenAiBackend};
//!
//! let backend = Arc::new(OpenAiBackend::from_config(&config)?);
//! let client = InferenceClient::new(backend, &config);
//!
//! let mut context = InferenceContext::new();
//! context.insert("headline", "IB Chemistry teacher in Dubai");
//! let nationality = client.infer(Field::Nationality, &context).await;
//! ```
//!
//! Failures never escape the client: a call that keeps failing, or fails in a
//! way retrying cannot fix, yields [`Inferred::Unknown`].

pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::InferenceCache;
use crate::config::{RetryPolicy, RunConfig, MAX_BACKOFF};
use crate::error::{InferenceError, InferenceResult};
use crate::models::Field;
use crate::transform::normalize::is_placeholder;

pub use openai::OpenAiBackend;

// =============================================================================
// Types
// =============================================================================

/// Outcome of inferring one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inferred {
    Value(String),
    Unknown,
}

impl Inferred {
    pub fn value(&self) -> Option<&str> {
        match self {
            Inferred::Value(v) => Some(v),
            Inferred::Unknown => None,
        }
    }
}

/// Text the service reasons from: resolved fields plus free-text source
/// columns, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceContext {
    entries: BTreeMap<String, String>,
}

impl InferenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry unless the key is taken or the value is blank.
    pub fn insert(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.entries
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hex SHA-256 over the entries; the cache key for this context.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.entries {
            hasher.update(key.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Inference statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceStats {
    /// Field lookups requested by the engine.
    pub lookups: usize,
    /// Lookups answered from the cache.
    pub cache_hits: usize,
    /// Outbound attempts, retries included.
    pub calls: usize,
    pub retries: usize,
    /// Batches given up on (exhausted or non-transient).
    pub failures: usize,
    /// Lookups that ended as `Unknown`.
    pub unresolved: usize,
}

// =============================================================================
// Backend Trait
// =============================================================================

/// One request to an inference service.
///
/// Implementations return whatever fields they could answer; missing keys
/// are treated as unknown.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fields answerable in one call; `1` disables batching.
    fn max_batch(&self) -> usize {
        1
    }

    async fn infer(
        &self,
        fields: &[Field],
        context: &InferenceContext,
    ) -> InferenceResult<BTreeMap<Field, String>>;
}

/// Backend that answers nothing, for offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

#[async_trait]
impl InferenceBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn max_batch(&self) -> usize {
        usize::MAX
    }

    async fn infer(
        &self,
        _fields: &[Field],
        _context: &InferenceContext,
    ) -> InferenceResult<BTreeMap<Field, String>> {
        Ok(BTreeMap::new())
    }
}

/// Pick the backend for a run.
///
/// # Errors
/// [`InferenceError::MissingApiKey`] when online and no key is configured.
pub fn backend_for(config: &RunConfig, offline: bool) -> InferenceResult<Arc<dyn InferenceBackend>> {
    if offline {
        return Ok(Arc::new(OfflineBackend));
    }
    Ok(Arc::new(OpenAiBackend::from_config(config)?))
}

// =============================================================================
// Client
// =============================================================================

#[derive(Default)]
struct Counters {
    lookups: AtomicUsize,
    cache_hits: AtomicUsize,
    calls: AtomicUsize,
    retries: AtomicUsize,
    failures: AtomicUsize,
    unresolved: AtomicUsize,
}

/// Shared, run-scoped inference client. Cheap to clone.
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn InferenceBackend>,
    cache: Arc<InferenceCache>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &RunConfig) -> Self {
        Self {
            backend,
            cache: Arc::new(InferenceCache::new()),
            retry: config.retry.clone(),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Infer a single field.
    pub async fn infer(&self, field: Field, context: &InferenceContext) -> Inferred {
        self.infer_fields(&[field], context)
            .await
            .remove(&field)
            .unwrap_or(Inferred::Unknown)
    }

    /// Infer several fields of one record.
    ///
    /// Fields are grouped into batches of the backend's `max_batch`; every
    /// requested field appears in the result. System fields are never sent
    /// out and come back `Unknown`.
    pub async fn infer_fields(
        &self,
        fields: &[Field],
        context: &InferenceContext,
    ) -> BTreeMap<Field, Inferred> {
        let mut results: BTreeMap<Field, Inferred> = BTreeMap::new();
        let mut wanted: Vec<Field> = Vec::with_capacity(fields.len());
        for &field in fields {
            if field.is_system() {
                results.insert(field, Inferred::Unknown);
            } else if !wanted.contains(&field) {
                wanted.push(field);
            }
        }
        if wanted.is_empty() {
            return results;
        }

        let digest = context.digest();
        let batch_size = self.backend.max_batch().max(1);
        self.counters.lookups.fetch_add(wanted.len(), Ordering::Relaxed);

        let mut pending = Vec::with_capacity(wanted.len());
        for chunk in wanted.chunks(batch_size) {
            let lookup = self.cache.lookup_or_start(chunk, &digest, |misses| {
                let call = BackendCall {
                    backend: self.backend.clone(),
                    retry: self.retry.clone(),
                    permits: self.permits.clone(),
                    counters: self.counters.clone(),
                };
                let context = context.clone();
                async move { call.run(misses, context).await }.boxed()
            });
            self.counters.cache_hits.fetch_add(lookup.hits, Ordering::Relaxed);
            pending.extend(lookup.pending);
        }

        let (keys, futures): (Vec<Field>, Vec<_>) = pending.into_iter().unzip();
        for (field, answer) in keys.into_iter().zip(join_all(futures).await) {
            if answer == Inferred::Unknown {
                self.counters.unresolved.fetch_add(1, Ordering::Relaxed);
            }
            results.insert(field, answer);
        }
        results
    }

    pub fn stats(&self) -> InferenceStats {
        let c = &self.counters;
        InferenceStats {
            lookups: c.lookups.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            calls: c.calls.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            unresolved: c.unresolved.load(Ordering::Relaxed),
        }
    }
}

/// Everything one cached batch needs to run on its own.
struct BackendCall {
    backend: Arc<dyn InferenceBackend>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl BackendCall {
    async fn run(self, fields: Vec<Field>, context: InferenceContext) -> BTreeMap<Field, Inferred> {
        let unknown_all = |fields: &[Field]| -> BTreeMap<Field, Inferred> {
            fields.iter().map(|f| (*f, Inferred::Unknown)).collect()
        };

        for attempt in 1..=self.retry.max_attempts {
            let outcome = match self.attempt(&fields, &context).await {
                Some(outcome) => outcome,
                None => return unknown_all(&fields),
            };

            match outcome {
                Ok(values) => {
                    debug!(backend = self.backend.name(), attempt, fields = fields.len(), "inference answered");
                    return fields
                        .iter()
                        .map(|f| {
                            let answer = match values.get(f) {
                                Some(v) if !is_placeholder(v) => Inferred::Value(v.trim().to_string()),
                                _ => Inferred::Unknown,
                            };
                            (*f, answer)
                        })
                        .collect();
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = retry_delay(&self.retry, attempt, &e);
                    warn!(
                        "Inference attempt {}/{} failed: {} (retrying in {}ms)",
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("Inference gave up after {} attempt(s): {}", attempt, e);
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    return unknown_all(&fields);
                }
            }
        }

        // max_attempts is validated to be >= 1, so the loop always returns.
        unknown_all(&fields)
    }

    /// One bounded attempt. `None` when the permit pool is gone.
    async fn attempt(
        &self,
        fields: &[Field],
        context: &InferenceContext,
    ) -> Option<InferenceResult<BTreeMap<Field, String>>> {
        let _permit = self.permits.acquire().await.ok()?;
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::time::timeout(self.retry.attempt_timeout, self.backend.infer(fields, context))
            .await
            .unwrap_or(Err(InferenceError::Timeout));
        Some(outcome)
    }
}

/// Backoff for `attempt`, stretched to a `Retry-After` hint but never past
/// [`MAX_BACKOFF`].
fn retry_delay(retry: &RetryPolicy, attempt: u32, error: &InferenceError) -> Duration {
    let delay = retry.backoff_for(attempt);
    match error {
        InferenceError::RateLimited(Some(secs)) => delay.max(Duration::from_secs(*secs)).min(MAX_BACKOFF),
        _ => delay,
    }
}
