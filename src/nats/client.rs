use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

#[cfg(test)]
use mockall::automock;

use crate::config::NatsConfig;
use crate::errors::NatsError;
use crate::Result;

/// One message delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsMessage {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

/// The pub/sub surface the core consumes. The client layer owns reconnection;
/// calls during an outage fail and are logged by the caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NatsClient: Send + Sync + 'static {
    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<()>;

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<()>;

    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<mpsc::Receiver<NatsMessage>>;

    fn new_inbox(&self) -> String;
}

/// Adapter over `async_nats`. Subscriptions are forwarded into a channel so
/// consumers can select over them alongside timers and signals.
pub struct CoreNatsClient {
    client: async_nats::Client,
}

impl CoreNatsClient {
    pub async fn connect(settings: &NatsConfig) -> Result<Self> {
        let mut options = async_nats::ConnectOptions::new();
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            options = options.user_and_password(username.clone(), password.clone());
        }

        let client = options
            .connect(settings.addresses.join(","))
            .await
            .map_err(|err| NatsError::Connect(err.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl NatsClient for CoreNatsClient {
    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|err| NatsError::Publish(err.to_string()))?;
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload.into())
            .await
            .map_err(|err| NatsError::Publish(err.to_string()))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<mpsc::Receiver<NatsMessage>> {
        let mut subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|err| NatsError::Subscribe(err.to_string()))?;

        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let forwarded = NatsMessage {
                    subject: message.subject.to_string(),
                    reply: message.reply.map(|reply| reply.to_string()),
                    payload: message.payload.to_vec(),
                };
                if tx.send(forwarded).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }
}
