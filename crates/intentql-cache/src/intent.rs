//! Cache of planned intents, keyed on the request that produced them.

use crate::store::{Cache, CacheStats};
use intentql_core::{CacheSettings, QueryIntent};
use serde::Serialize;

#[derive(Serialize)]
struct IntentKey<'a> {
    prompt: String,
    schema: &'a str,
    tables: Vec<&'a str>,
}

impl<'a> IntentKey<'a> {
    fn new(prompt: &str, schema_fingerprint: &'a str, tables: &'a [String]) -> Self {
        let mut tables: Vec<&str> = tables.iter().map(String::as_str).collect();
        tables.sort_unstable();
        tables.dedup();
        Self {
            prompt: normalize_prompt(prompt),
            schema: schema_fingerprint,
            tables,
        }
    }
}

/// Lowercase and collapse whitespace runs.
fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Intents keyed on `(prompt, schema fingerprint, tables)`.
///
/// Prompts differing only in case or whitespace share an entry, and so do
/// table lists differing only in order or duplicates.
pub struct IntentCache {
    inner: Cache<QueryIntent>,
}

impl IntentCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            inner: Cache::from_settings(settings),
        }
    }

    pub fn get(
        &self,
        prompt: &str,
        schema_fingerprint: &str,
        tables: &[String],
    ) -> Option<QueryIntent> {
        self.inner
            .get(&IntentKey::new(prompt, schema_fingerprint, tables))
    }

    pub fn set(
        &self,
        prompt: &str,
        schema_fingerprint: &str,
        tables: &[String],
        intent: QueryIntent,
    ) {
        self.inner
            .set(&IntentKey::new(prompt, schema_fingerprint, tables), intent);
    }

    /// Return the cached intent, or plan one with `plan` and cache it.
    pub fn get_or_plan<F>(
        &self,
        prompt: &str,
        schema_fingerprint: &str,
        tables: &[String],
        plan: F,
    ) -> QueryIntent
    where
        F: FnOnce() -> QueryIntent,
    {
        self.inner
            .get_or_compute(&IntentKey::new(prompt, schema_fingerprint, tables), plan)
    }

    pub fn invalidate(&self, prompt: &str, schema_fingerprint: &str, tables: &[String]) -> bool {
        self.inner
            .delete(&IntentKey::new(prompt, schema_fingerprint, tables))
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
