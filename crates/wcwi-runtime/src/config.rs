//! Runtime configuration

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use wcwi_core::{DedupConfig, StoreConfig};

/// Settings for one [`SyncEngine`](crate::SyncEngine)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub dedup: DedupConfig,
}

impl EngineConfig {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            dedup: DedupConfig::default(),
        }
    }

    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }
}

/// Settings for the [`ConnectionCoordinator`](crate::ConnectionCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// An IP host also joins itself over loopback
    pub self_connect: bool,
    /// Display name sent as `HELLO:<name>` after joining
    pub greeting: Option<String>,
    /// Backoff for the loopback self-connect
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            self_connect: true,
            greeting: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_self_connect(mut self, enabled: bool) -> Self {
        self.self_connect = enabled;
        self
    }

    pub fn with_greeting(mut self, name: impl Into<String>) -> Self {
        self.greeting = Some(name.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
