//! Scheduler API endpoint settings.
use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Base URL of the scheduler API
    /// Default value: http://127.0.0.1:8887 (via default_scheduler_address)
    #[serde(default = "default_scheduler_address")]
    pub address: String,

    /// Per-request timeout for snapshot fetches, in milliseconds
    /// Default value: 5000 (via default_request_timeout_ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            address: default_scheduler_address(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
            return Err(Error::Config(ConfigError::Message(format!(
                "scheduler.address must be an http(s) URL, got {}",
                self.address
            ))));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "scheduler.request_timeout_ms cannot be 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_scheduler_address() -> String {
    "http://127.0.0.1:8887".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}
