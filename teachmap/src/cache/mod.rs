//! Inference Cache - Reuse inference answers within one run
//!
//! Entries are keyed by (field, context digest) and hold shared futures, so a
//! lookup that arrives while the first call for the same key is still in
//! flight awaits that call instead of starting another one.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use crate::inference::Inferred;
use crate::models::Field;

/// A pending or finished answer for one field.
pub type SharedInference = Shared<BoxFuture<'static, Inferred>>;

/// Answers of one backend call, one entry per requested field.
pub type BatchAnswer = Arc<BTreeMap<Field, Inferred>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    field: Field,
    digest: String,
}

/// Run-scoped cache of inference answers.
#[derive(Default)]
pub struct InferenceCache {
    entries: Mutex<HashMap<CacheKey, SharedInference>>,
}

/// Result of [`InferenceCache::lookup_or_start`].
pub struct Lookup {
    /// One future per requested field, request order.
    pub pending: Vec<(Field, SharedInference)>,
    /// How many of them were already cached.
    pub hits: usize,
}

impl InferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached future for every field, starting one batch for the
    /// misses.
    ///
    /// `start` receives the missing fields and is invoked at most once; its
    /// future is shared by every missing field. The check and the insert
    /// happen under one lock, so concurrent callers with the same key never
    /// both start a call.
    pub fn lookup_or_start<F>(&self, fields: &[Field], digest: &str, start: F) -> Lookup
    where
        F: FnOnce(Vec<Field>) -> BoxFuture<'static, BTreeMap<Field, Inferred>>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let misses: Vec<Field> = fields
            .iter()
            .copied()
            .filter(|f| !entries.contains_key(&key(*f, digest)))
            .collect();
        let hits = fields.len() - misses.len();

        if !misses.is_empty() {
            let batch: Shared<BoxFuture<'static, BatchAnswer>> =
                start(misses.clone()).map(Arc::new).boxed().shared();

            for field in misses {
                let per_field = batch
                    .clone()
                    .map(move |answers| answers.get(&field).cloned().unwrap_or(Inferred::Unknown))
                    .boxed()
                    .shared();
                entries.insert(key(field, digest), per_field);
            }
        }

        let pending = fields
            .iter()
            .filter_map(|f| entries.get(&key(*f, digest)).map(|fut| (*f, fut.clone())))
            .collect();

        Lookup { pending, hits }
    }

    /// Number of cached (field, context) pairs.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(field: Field, digest: &str) -> CacheKey {
    CacheKey {
        field,
        digest: digest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn answering(
        calls: Arc<AtomicUsize>,
    ) -> impl FnOnce(Vec<Field>) -> BoxFuture<'static, BTreeMap<Field, Inferred>> {
        move |fields| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                fields
                    .into_iter()
                    .map(|f| (f, Inferred::Value(format!("{}-value", f.name()))))
                    .collect()
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_second_lookup_hits() {
        let cache = InferenceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.lookup_or_start(&[Field::Nationality], "abc", answering(calls.clone()));
        assert_eq!(first.hits, 0);
        let value = first.pending[0].1.clone().await;
        assert_eq!(value, Inferred::Value("Nationality-value".into()));

        let second = cache.lookup_or_start(&[Field::Nationality], "abc", answering(calls.clone()));
        assert_eq!(second.hits, 1);
        assert_eq!(second.pending[0].1.clone().await, value);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_hit_starts_batch_for_misses_only() {
        let cache = InferenceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.lookup_or_start(&[Field::Nationality], "ctx", answering(calls.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let lookup = cache.lookup_or_start(&[Field::Nationality, Field::Subject], "ctx", move |misses| {
            seen_in.lock().unwrap().extend(misses.clone());
            async move { misses.into_iter().map(|f| (f, Inferred::Unknown)).collect() }.boxed()
        });

        assert_eq!(lookup.hits, 1);
        assert_eq!(*seen.lock().unwrap(), vec![Field::Subject]);
        assert_eq!(lookup.pending.len(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_different_digest_is_a_miss() {
        let cache = InferenceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.lookup_or_start(&[Field::Bio], "a", answering(calls.clone()));
        cache.lookup_or_start(&[Field::Bio], "b", answering(calls.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
