//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capacity and TTL of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of entries before eviction.
    pub capacity: usize,
    /// Default time-to-live, in seconds.
    pub ttl_secs: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Medium TTL, modest capacity: planned intents stay valid while the schema does.
    pub fn intent_defaults() -> Self {
        Self {
            capacity: 500,
            ttl_secs: 3_600,
        }
    }

    /// Short TTL: result rows go stale quickly.
    pub fn result_defaults() -> Self {
        Self {
            capacity: 200,
            ttl_secs: 300,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl_secs: 600,
        }
    }
}

/// Per-kind cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheSettings::intent_defaults")]
    pub intent: CacheSettings,

    #[serde(default = "CacheSettings::result_defaults")]
    pub result: CacheSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            intent: CacheSettings::intent_defaults(),
            result: CacheSettings::result_defaults(),
        }
    }
}
