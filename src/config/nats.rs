//! Pub/sub bus connectivity settings.
use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NatsConfig {
    /// NATS server addresses, tried in order
    /// Default value: ["nats://127.0.0.1:4222"] (via default_nats_addresses)
    #[serde(default = "default_nats_addresses")]
    pub addresses: Vec<String>,

    /// Optional credentials; both must be set together
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            addresses: default_nats_addresses(),
            username: None,
            password: None,
        }
    }
}

impl NatsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.addresses.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "nats.addresses cannot be empty".into(),
            )));
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "nats.username and nats.password must be set together".into(),
            )));
        }

        Ok(())
    }
}

fn default_nats_addresses() -> Vec<String> {
    vec!["nats://127.0.0.1:4222".to_string()]
}
