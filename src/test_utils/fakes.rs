use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::SchedulerError;
use crate::nats::Emitter;
use crate::nats::NatsClient;
use crate::nats::NatsMessage;
use crate::routing_table::MessagesToEmit;
use crate::scheduler::Event;
use crate::scheduler::EventSource;
use crate::Result;

/// Test-side feeder for watcher event sources. Every [`FakeEventStream::source`]
/// shares the same queue, so a resubscribed source picks up where the failed
/// one left off.
#[derive(Clone)]
pub struct FakeEventStream {
    tx: mpsc::UnboundedSender<Result<Event>>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Event>>>>,
    closed_sources: Arc<AtomicUsize>,
}

impl FakeEventStream {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            closed_sources: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn source(&self) -> FakeEventSource {
        FakeEventSource {
            rx: self.rx.clone(),
            closed: AtomicBool::new(false),
            closed_sources: self.closed_sources.clone(),
        }
    }

    pub fn send(
        &self,
        event: Event,
    ) {
        let _ = self.tx.send(Ok(event));
    }

    pub fn send_error(&self) {
        let _ = self.tx.send(Err(SchedulerError::EventFrame("fake stream error".into()).into()));
    }

    pub fn closed_sources(&self) -> usize {
        self.closed_sources.load(Ordering::SeqCst)
    }
}

pub struct FakeEventSource {
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Event>>>>,
    closed: AtomicBool,
    closed_sources: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn next(&mut self) -> Result<Event> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::StreamClosed.into());
        }

        match self.rx.lock().await.recv().await {
            Some(item) => item,
            None => Err(SchedulerError::StreamClosed.into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_sources.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory pub/sub bus: published messages are recorded and delivered to
/// matching subscriptions, so tests can both observe outbound traffic and
/// inject router messages.
#[derive(Default)]
pub struct FakeNatsClient {
    subscriptions: Mutex<HashMap<String, Vec<mpsc::Sender<NatsMessage>>>>,
    published: Mutex<Vec<NatsMessage>>,
    inbox_counter: AtomicU64,
}

impl FakeNatsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_on(
        &self,
        subject: &str,
    ) -> Vec<NatsMessage> {
        self.published
            .lock()
            .iter()
            .filter(|message| message.subject == subject)
            .cloned()
            .collect()
    }

    /// Delivers a message to subscribers as if the router had published it.
    pub fn inject(
        &self,
        subject: &str,
        payload: &[u8],
    ) {
        self.deliver(&NatsMessage {
            subject: subject.to_string(),
            reply: None,
            payload: payload.to_vec(),
        });
    }

    fn deliver(
        &self,
        message: &NatsMessage,
    ) {
        let subscriptions = self.subscriptions.lock();
        if let Some(senders) = subscriptions.get(&message.subject) {
            for sender in senders {
                let _ = sender.try_send(message.clone());
            }
        }
    }
}

#[async_trait]
impl NatsClient for FakeNatsClient {
    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let message = NatsMessage {
            subject: subject.to_string(),
            reply: None,
            payload,
        };
        self.published.lock().push(message.clone());
        self.deliver(&message);
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let message = NatsMessage {
            subject: subject.to_string(),
            reply: Some(reply.to_string()),
            payload,
        };
        self.published.lock().push(message.clone());
        self.deliver(&message);
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<mpsc::Receiver<NatsMessage>> {
        let (tx, rx) = mpsc::channel(64);
        self.subscriptions.lock().entry(subject.to_string()).or_default().push(tx);
        Ok(rx)
    }

    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", self.inbox_counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// Captures everything handed to it, mirroring what would go out on the bus.
#[derive(Default)]
pub struct FakeEmitter {
    emitted: Mutex<Vec<MessagesToEmit>>,
}

impl FakeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_count(&self) -> usize {
        self.emitted.lock().len()
    }

    pub fn emitted(&self) -> Vec<MessagesToEmit> {
        self.emitted.lock().clone()
    }

    /// Polls until at least `count` emits were captured. Meant for tests on a
    /// paused clock, where the sleeps auto-advance virtual time.
    pub async fn wait_for_emit_count(
        &self,
        count: usize,
    ) {
        loop {
            if self.emit_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Emitter for FakeEmitter {
    async fn emit(
        &self,
        messages: &MessagesToEmit,
    ) -> Result<()> {
        self.emitted.lock().push(messages.clone());
        Ok(())
    }
}
