//! Sync and router-handshake periods.
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Period of the full table rebuild from scheduler snapshots
    /// Default value: 30 (via default_sync_interval_secs)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Cadence of `router.greet` until the router declares its interval
    /// Default value: 1 (via default_greet_interval_secs)
    #[serde(default = "default_greet_interval_secs")]
    pub greet_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            greet_interval_secs: default_greet_interval_secs(),
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn greet_interval(&self) -> Duration {
        Duration::from_secs(self.greet_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sync.sync_interval_secs cannot be 0".into(),
            )));
        }

        if self.greet_interval_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sync.greet_interval_secs cannot be 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_greet_interval_secs() -> u64 {
    1
}
