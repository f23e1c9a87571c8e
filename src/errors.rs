//! Route Emitter Error Hierarchy
//!
//! Defines error types for the emitter, categorized by the external
//! collaborator they originate from.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Scheduler API and event-stream failures
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Pub/sub bus failures
    #[error(transparent)]
    Nats(#[from] NatsError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// HTTP transport failures
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-2xx responses from the scheduler API
    #[error("Scheduler responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Response payload decode failures
    #[error("Failed to decode scheduler payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Malformed frames on the event stream
    #[error("Malformed event frame: {0}")]
    EventFrame(String),

    /// The event stream ended or the subscription was closed
    #[error("Event stream closed")]
    StreamClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum NatsError {
    /// Connection establishment failures
    #[error("NATS connect failed: {0}")]
    Connect(String),

    /// Publish failures; emits are re-announced on the next heartbeat
    #[error("NATS publish failed: {0}")]
    Publish(String),

    /// Subscription setup failures
    #[error("NATS subscribe failed: {0}")]
    Subscribe(String),

    /// Wire message encode failures
    #[error("Failed to encode wire message: {0}")]
    Serialization(#[from] serde_json::Error),
}
