//! Per-run sync parameters

use decksync_common::config::{DeckScope, SyncConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs for one run; defaults come from `[sync]` in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncParameters {
    /// Maximum listing pages fetched
    pub page_cap: u32,
    /// Concurrent workers per stage
    pub worker_limit: usize,
    /// Wall-clock bound; 0 disables the timeout
    pub run_timeout_secs: u64,
    pub deck_scope: DeckScope,
}

impl SyncParameters {
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    /// Worker count never drops below one
    pub fn workers(&self) -> usize {
        self.worker_limit.max(1)
    }
}

impl Default for SyncParameters {
    fn default() -> Self {
        SyncConfig::default().into()
    }
}

impl From<SyncConfig> for SyncParameters {
    fn from(config: SyncConfig) -> Self {
        Self {
            page_cap: config.page_cap,
            worker_limit: config.worker_limit,
            run_timeout_secs: config.run_timeout_secs,
            deck_scope: config.deck_scope,
        }
    }
}
