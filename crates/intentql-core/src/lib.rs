//! # intentql-core
//!
//! Types shared by every IntentQL crate:
//!
//! - the query intent model ([`QueryIntent`], [`Filter`], [`CompiledQuery`], ...)
//! - SQL dialect profiles ([`SqlDialect`], [`Dialect`])
//! - configuration ([`IntentqlConfig`] and its sections)

pub mod config;
pub mod dialect;
pub mod intent;

pub use config::{
    CacheConfig, CacheSettings, ConfigError, ExplainConfig, GuardrailsConfig, IntentqlConfig,
    PolicyConfig, PredicateValue, TablePolicy, TenantScope,
};
pub use dialect::{Dialect, PatternRule, PlanFormat, SqlDialect, UnknownDialect};
pub use intent::{
    AggregateFunc, Aggregation, BindCast, BindSpecEntry, CompiledQuery, Filter, FilterOp,
    IntentKind, OrderSpec, Principal, QueryIntent, QueryShape, SortDirection,
    parse_aggregate_expr,
};
