use serde::Deserialize;
use serde::Serialize;

use super::Endpoint;
use super::Routes;

/// The outbound wire record consumed by the front-end router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMessage {
    pub host: String,
    pub port: u16,
    pub uris: Vec<String>,
    pub app: String,
    pub private_instance_id: String,
}

/// Pairs one endpoint with one Routes value.
pub fn registry_message_for(
    endpoint: &Endpoint,
    routes: &Routes,
) -> RegistryMessage {
    RegistryMessage {
        host: endpoint.host.clone(),
        port: endpoint.port,
        uris: routes.hostnames.clone(),
        app: routes.log_guid.clone(),
        private_instance_id: endpoint.instance_guid.clone(),
    }
}

/// The exact deltas implied by one table mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagesToEmit {
    pub registrations: Vec<RegistryMessage>,
    pub unregistrations: Vec<RegistryMessage>,
}

impl MessagesToEmit {
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.unregistrations.is_empty()
    }

    pub fn merge(
        &mut self,
        other: MessagesToEmit,
    ) {
        self.registrations.extend(other.registrations);
        self.unregistrations.extend(other.unregistrations);
    }

    /// Number of (hostname, endpoint) bindings registered; messages group the
    /// hostnames of one endpoint, so this sums their URIs.
    pub fn registration_count(&self) -> usize {
        self.registrations.iter().map(|message| message.uris.len()).sum()
    }

    pub fn unregistration_count(&self) -> usize {
        self.unregistrations.iter().map(|message| message.uris.len()).sum()
    }
}
