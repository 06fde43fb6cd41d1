//! Cache of query results, keyed on the statement and its bound values.

use crate::store::{Cache, CacheStats};
use intentql_core::{CacheSettings, CompiledQuery};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Serialize)]
struct ResultKey<'a> {
    sql: String,
    params: BTreeMap<&'a str, &'a Value>,
}

impl<'a> ResultKey<'a> {
    fn new<I>(sql: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        Self {
            sql: sql.split_whitespace().collect::<Vec<_>>().join(" "),
            params: params.into_iter().collect(),
        }
    }
}

/// Result rows keyed on `(sql, params)`.
///
/// SQL text is compared with whitespace runs collapsed; parameters are
/// compared as a sorted map, so their order does not matter. Case is kept
/// because string literals and quoted identifiers are case-sensitive.
pub struct QueryResultCache {
    inner: Cache<Value>,
}

impl QueryResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            inner: Cache::from_settings(settings),
        }
    }

    pub fn get<'a, I>(&self, sql: &str, params: I) -> Option<Value>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.inner.get(&ResultKey::new(sql, params))
    }

    pub fn set<'a, I>(&self, sql: &str, params: I, rows: Value)
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.inner.set(&ResultKey::new(sql, params), rows);
    }

    pub fn set_with_ttl<'a, I>(&self, sql: &str, params: I, rows: Value, ttl: Duration)
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.inner
            .set_with_ttl(&ResultKey::new(sql, params), rows, ttl);
    }

    /// Cached rows for a compiled query.
    pub fn get_compiled(&self, query: &CompiledQuery) -> Option<Value> {
        self.get(&query.sql, compiled_params(query))
    }

    pub fn set_compiled(&self, query: &CompiledQuery, rows: Value) {
        self.set(&query.sql, compiled_params(query), rows);
    }

    pub fn invalidate<'a, I>(&self, sql: &str, params: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.inner.delete(&ResultKey::new(sql, params))
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

fn compiled_params(query: &CompiledQuery) -> impl Iterator<Item = (&str, &Value)> {
    query.params.iter().map(|(k, v)| (k.as_str(), v))
}
