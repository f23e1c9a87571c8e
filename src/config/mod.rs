//! Configuration management for the route emitter.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod monitoring;
mod nats;
mod scheduler;
mod sync;

pub use monitoring::*;
pub use nats::*;
pub use scheduler::*;
pub use sync::*;


//---
use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the emitter's subsystems.
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct RouteEmitterConfig {
    /// Pub/sub bus connectivity
    pub nats: NatsConfig,
    /// Scheduler API endpoint
    pub scheduler: SchedulerConfig,
    /// Sync and handshake periods
    pub sync: SyncConfig,
    /// Metrics and monitoring settings
    pub monitoring: MonitoringConfig,
}

impl Debug for RouteEmitterConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RouteEmitterConfig")
            .field("scheduler", &self.scheduler)
            .field("sync", &self.sync)
            .finish()
    }
}

impl RouteEmitterConfig {
    /// Loads configuration with hierarchical override support.
    ///
    /// Sources are merged in the following order (later sources override
    /// earlier ones):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from the `CONFIG_PATH` environment variable
    /// 3. Environment variables with `ROUTE_EMITTER__` prefix (highest
    ///    priority)
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/emitter.toml");
    /// std::env::set_var("ROUTE_EMITTER__SYNC__SYNC_INTERVAL_SECS", "10");
    /// let cfg = RouteEmitterConfig::load()?;
    /// ```
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("ROUTE_EMITTER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("nats.addresses"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-component configuration rules.
    pub fn validate(&self) -> Result<()> {
        self.nats.validate()?;
        self.scheduler.validate()?;
        self.sync.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
