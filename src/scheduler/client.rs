use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::SchedulerConfig;
use crate::errors::SchedulerError;
use crate::ActualLrp;
use crate::DesiredLrp;
use crate::Result;

use super::Event;

/// The scheduler API surface the core consumes: full snapshots plus the
/// incremental event stream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SchedulerClient: Send + Sync + 'static {
    async fn desired_lrps(&self) -> Result<Vec<DesiredLrp>>;
    async fn actual_lrps(&self) -> Result<Vec<ActualLrp>>;
    async fn subscribe_to_events(&self) -> Result<Box<dyn EventSource>>;
}

/// One live event subscription. Closing it makes any in-flight `next` return
/// an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventSource: Send + 'static {
    async fn next(&mut self) -> Result<Event>;
    async fn close(&mut self) -> Result<()>;
}

/// HTTP client for the scheduler's list endpoints and server-sent event
/// stream.
pub struct HttpSchedulerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSchedulerClient {
    pub fn new(settings: &SchedulerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(SchedulerError::Http)?;

        Ok(Self {
            base_url: settings.address.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(SchedulerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulerError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(response.json::<T>().await.map_err(SchedulerError::Http)?)
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    async fn desired_lrps(&self) -> Result<Vec<DesiredLrp>> {
        self.get_json("/v1/desired_lrps").await
    }

    async fn actual_lrps(&self) -> Result<Vec<ActualLrp>> {
        self.get_json("/v1/actual_lrps").await
    }

    async fn subscribe_to_events(&self) -> Result<Box<dyn EventSource>> {
        let response = self
            .http
            .get(format!("{}/v1/events", self.base_url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(SchedulerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulerError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(Box::new(SseEventSource {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            closed: false,
        }))
    }
}

/// Incremental server-sent-event parser over the scheduler's `/v1/events`
/// response body.
struct SseEventSource {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
    closed: bool,
}

#[async_trait]
impl EventSource for SseEventSource {
    async fn next(&mut self) -> Result<Event> {
        loop {
            if self.closed {
                return Err(SchedulerError::StreamClosed.into());
            }

            if let Some(frame) = self.extract_frame() {
                return parse_event_frame(&frame);
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => {
                    let text = String::from_utf8_lossy(&chunk);
                    self.buffer.push_str(&text);
                }
                Some(Err(err)) => return Err(SchedulerError::Http(err).into()),
                None => return Err(SchedulerError::StreamClosed.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl SseEventSource {
    /// Pops one `\n\n`-terminated frame off the buffer, if complete.
    fn extract_frame(&mut self) -> Option<String> {
        let boundary = self.buffer.find("\n\n")?;
        let frame = self.buffer[..boundary].to_string();
        self.buffer.drain(..boundary + 2);
        Some(frame)
    }
}

fn parse_event_frame(frame: &str) -> Result<Event> {
    let mut event_type = None;
    let mut data = None;

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data = Some(value.trim().to_string());
        }
    }

    let Some(event_type) = event_type else {
        return Err(SchedulerError::EventFrame(format!("missing event type: {frame:?}")).into());
    };

    let decode = |payload: Option<&String>| -> std::result::Result<serde_json::Value, SchedulerError> {
        let Some(payload) = payload else {
            return Err(SchedulerError::EventFrame(format!("missing data for {event_type}")));
        };
        Ok(serde_json::from_str(payload)?)
    };

    match event_type.as_str() {
        "desired_lrp_created" => {
            let payload: DesiredLrpPayload = serde_json::from_value(decode(data.as_ref())?).map_err(SchedulerError::Decode)?;
            Ok(Event::DesiredLrpCreated(payload.desired_lrp))
        }
        "desired_lrp_changed" => {
            let payload: DesiredLrpChangePayload = serde_json::from_value(decode(data.as_ref())?).map_err(SchedulerError::Decode)?;
            Ok(Event::DesiredLrpChanged {
                before: payload.desired_lrp_before,
                after: payload.desired_lrp_after,
            })
        }
        "desired_lrp_removed" => {
            let payload: DesiredLrpPayload = serde_json::from_value(decode(data.as_ref())?).map_err(SchedulerError::Decode)?;
            Ok(Event::DesiredLrpRemoved(payload.desired_lrp))
        }
        "actual_lrp_created" => {
            let payload: ActualLrpPayload = serde_json::from_value(decode(data.as_ref())?).map_err(SchedulerError::Decode)?;
            Ok(Event::ActualLrpCreated(payload.actual_lrp))
        }
        "actual_lrp_changed" => {
            let payload: ActualLrpChangePayload = serde_json::from_value(decode(data.as_ref())?).map_err(SchedulerError::Decode)?;
            Ok(Event::ActualLrpChanged {
                before: payload.actual_lrp_before,
                after: payload.actual_lrp_after,
            })
        }
        "actual_lrp_removed" => {
            let payload: ActualLrpPayload = serde_json::from_value(decode(data.as_ref())?).map_err(SchedulerError::Decode)?;
            Ok(Event::ActualLrpRemoved(payload.actual_lrp))
        }
        other => {
            debug!("[SchedulerClient] unknown event type on stream: {other}");
            Ok(Event::Unrecognized {
                event_type: other.to_string(),
            })
        }
    }
}

#[derive(Deserialize)]
struct DesiredLrpPayload {
    desired_lrp: DesiredLrp,
}

#[derive(Deserialize)]
struct DesiredLrpChangePayload {
    desired_lrp_before: DesiredLrp,
    desired_lrp_after: DesiredLrp,
}

#[derive(Deserialize)]
struct ActualLrpPayload {
    actual_lrp: ActualLrp,
}

#[derive(Deserialize)]
struct ActualLrpChangePayload {
    actual_lrp_before: ActualLrp,
    actual_lrp_after: ActualLrp,
}
