use std::time::Duration;

use serde::Deserialize;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

// =======================================================
// CACHE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory of the embedded store.
    pub db_path: String,
    pub ttl_days: u64,
    pub reclaim_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "./data/cache".into(),
            ttl_days: 7,
            reclaim_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub fn ttl_days(&self) -> u64 {
        self.ttl_days
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &CacheConfig) {
        if self.reclaim_interval_secs == 0 {
            self.reclaim_interval_secs = defaults.reclaim_interval_secs;
        }
    }
}
