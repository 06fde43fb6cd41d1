//! # intentql-cache
//!
//! Bounded, TTL-expiring caches that spare the planner and the database
//! repeated work.
//!
//! [`Cache`] is the generic store: keys are any `Serialize` value reduced
//! to a SHA-256 of their canonical JSON, entries expire after a TTL, and a
//! full store evicts its least used entries. [`IntentCache`] and
//! [`QueryResultCache`] wrap it with the key normalization each use needs.

pub mod intent;
pub mod key;
pub mod result;
pub mod store;

pub use intent::IntentCache;
pub use key::content_hash;
pub use result::QueryResultCache;
pub use store::{Cache, CacheEntry, CacheStats};
