use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::constants::ROUTER_REGISTER_SUBJECT;
use crate::constants::ROUTER_UNREGISTER_SUBJECT;
use crate::routing_table::MessagesToEmit;
use crate::routing_table::RegistryMessage;
use crate::Result;

use super::NatsClient;

/// Where table diffs leave the process.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Emitter: Send + Sync + 'static {
    async fn emit(
        &self,
        messages: &MessagesToEmit,
    ) -> Result<()>;
}

/// Publishes registrations to `router.register` and unregistrations to
/// `router.unregister`.
///
/// A failed publish is logged and skipped: every binding is re-announced on
/// the next heartbeat, so a dropped message heals itself.
pub struct NatsEmitter<N: NatsClient> {
    nats: Arc<N>,
}

impl<N: NatsClient> NatsEmitter<N> {
    pub fn new(nats: Arc<N>) -> Self {
        Self { nats }
    }

    async fn publish(
        &self,
        subject: &str,
        message: &RegistryMessage,
    ) {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("[NatsEmitter] failed to encode registry message: {err}");
                return;
            }
        };

        if let Err(err) = self.nats.publish(subject, payload).await {
            warn!("[NatsEmitter] publish to {subject} failed: {err}");
        }
    }
}

#[async_trait]
impl<N: NatsClient> Emitter for NatsEmitter<N> {
    async fn emit(
        &self,
        messages: &MessagesToEmit,
    ) -> Result<()> {
        for message in &messages.registrations {
            self.publish(ROUTER_REGISTER_SUBJECT, message).await;
        }
        for message in &messages.unregistrations {
            self.publish(ROUTER_UNREGISTER_SUBJECT, message).await;
        }
        Ok(())
    }
}
