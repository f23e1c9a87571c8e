//! Event-stream consumer translating scheduler events into table mutations.
//!
//! Coordinates with the syncer so events arriving during a snapshot are
//! buffered and replayed against the swapped table, never applied to a stale
//! one.

#[cfg(test)]
mod watcher_test;

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::metrics::ROUTES_REGISTERED;
use crate::metrics::ROUTES_UNREGISTERED;
use crate::nats::Emitter;
use crate::routing_table::endpoints_from_actual;
use crate::routing_table::routes_from_desired;
use crate::routing_table::routing_keys_from_desired;
use crate::routing_table::MessagesToEmit;
use crate::routing_table::RoutingTable;
use crate::scheduler::ActualLrp;
use crate::scheduler::ActualLrpState;
use crate::scheduler::DesiredLrp;
use crate::scheduler::Event;
use crate::scheduler::EventSource;
use crate::scheduler::SchedulerClient;
use crate::syncer::SyncSignals;
use crate::Result;

const RESUBSCRIBE_BASE_BACKOFF: Duration = Duration::from_secs(1);
const RESUBSCRIBE_MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    /// No subscription yet; waiting for the first sync to begin.
    Idle,
    /// Subscription active; events apply to the table as they arrive.
    Streaming,
    /// A sync is in flight; events queue up for replay after the swap.
    Buffering,
}

pub struct Watcher<S, E>
where
    S: SchedulerClient,
    E: Emitter,
{
    scheduler: Arc<S>,
    table: Arc<RoutingTable>,
    emitter: Arc<E>,
    sync_signals: Option<SyncSignals>,

    // Shutdown signal
    shutdown_signal: watch::Receiver<()>,
}

impl<S, E> Watcher<S, E>
where
    S: SchedulerClient,
    E: Emitter,
{
    pub fn new(
        scheduler: Arc<S>,
        table: Arc<RoutingTable>,
        emitter: Arc<E>,
        sync_signals: SyncSignals,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            scheduler,
            table,
            emitter,
            sync_signals: Some(sync_signals),
            shutdown_signal,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let SyncSignals {
            begin: mut begin_rx,
            end: mut end_rx,
        } = self.sync_signals.take().expect("Expected sync signals but found None");
        let mut shutdown_signal = self.shutdown_signal.clone();

        let mut state = WatcherState::Idle;
        let mut buffered: VecDeque<Event> = VecDeque::new();
        let mut event_source: Option<Box<dyn EventSource>> = None;
        let mut backoff = RESUBSCRIBE_BASE_BACKOFF;
        let mut resubscribe_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.changed() => {
                    if !buffered.is_empty() {
                        warn!("[Watcher] discarding {} buffered events on shutdown", buffered.len());
                    }
                    warn!("[Watcher] shutdown signal received.");
                    return Ok(());
                }

                Some(_) = begin_rx.recv() => {
                    match state {
                        WatcherState::Idle => {
                            debug!("[Watcher] first sync observed; subscribing to scheduler events");
                            match self.scheduler.subscribe_to_events().await {
                                Ok(source) => event_source = Some(source),
                                Err(err) => {
                                    error!("[Watcher] event subscription failed: {err}");
                                    resubscribe_at = Some(Instant::now() + backoff);
                                    backoff = (backoff * 2).min(RESUBSCRIBE_MAX_BACKOFF);
                                }
                            }
                            state = WatcherState::Buffering;
                        }
                        WatcherState::Streaming => {
                            debug!("[Watcher] sync started; buffering events");
                            state = WatcherState::Buffering;
                        }
                        WatcherState::Buffering => {
                            debug!("[Watcher] sync already in progress; ignoring sync signal");
                        }
                    }
                }

                Some(_) = end_rx.recv() => {
                    if state == WatcherState::Buffering {
                        debug!("[Watcher] sync complete; replaying {} buffered events", buffered.len());
                        while let Some(event) = buffered.pop_front() {
                            self.handle_event(event).await;
                        }
                        state = WatcherState::Streaming;
                    }
                }

                result = next_event(&mut event_source) => {
                    match result {
                        Ok(event) => {
                            backoff = RESUBSCRIBE_BASE_BACKOFF;
                            if state == WatcherState::Buffering {
                                buffered.push_back(event);
                            } else {
                                self.handle_event(event).await;
                            }
                        }
                        Err(err) => {
                            error!("[Watcher] event stream failed: {err}");
                            if let Some(mut source) = event_source.take() {
                                let _ = source.close().await;
                            }
                            resubscribe_at = Some(Instant::now() + backoff);
                            backoff = (backoff * 2).min(RESUBSCRIBE_MAX_BACKOFF);
                        }
                    }
                }

                _ = sleep_until_or_pending(resubscribe_at) => {
                    resubscribe_at = None;
                    match self.scheduler.subscribe_to_events().await {
                        Ok(source) => {
                            debug!("[Watcher] resubscribed to scheduler events");
                            event_source = Some(source);
                        }
                        Err(err) => {
                            warn!("[Watcher] resubscription failed: {err}");
                            resubscribe_at = Some(Instant::now() + backoff);
                            backoff = (backoff * 2).min(RESUBSCRIBE_MAX_BACKOFF);
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(
        &self,
        event: Event,
    ) {
        debug!("[Watcher] handling event for {:?}", event.key());
        match event {
            Event::DesiredLrpCreated(desired) => self.handle_desired_create(&desired).await,
            Event::DesiredLrpChanged { before, after } => self.handle_desired_change(&before, &after).await,
            Event::DesiredLrpRemoved(desired) => self.handle_desired_delete(&desired).await,
            Event::ActualLrpCreated(actual) => self.handle_actual_create(&actual).await,
            Event::ActualLrpChanged { before, after } => self.handle_actual_change(&before, &after).await,
            Event::ActualLrpRemoved(actual) => self.handle_actual_delete(&actual).await,
            Event::Unrecognized { event_type } => {
                debug!("[Watcher] unrecognized event type: {event_type}");
            }
        }
    }

    async fn handle_desired_create(
        &self,
        desired: &DesiredLrp,
    ) {
        for (key, routes) in routes_from_desired(desired) {
            let messages = self.table.set_routes(&key, routes);
            self.emit(messages).await;
        }
    }

    /// Sets routes for every key of the changed record and retracts keys the
    /// change no longer carries.
    async fn handle_desired_change(
        &self,
        before: &DesiredLrp,
        after: &DesiredLrp,
    ) {
        let after_routes = routes_from_desired(after);
        let after_keys: HashSet<_> = after_routes.iter().map(|(key, _)| key.clone()).collect();

        for (key, routes) in after_routes {
            let messages = self.table.set_routes(&key, routes);
            self.emit(messages).await;
        }

        for key in routing_keys_from_desired(before) {
            if !after_keys.contains(&key) {
                let messages = self.table.remove_routes(&key, &after.modification_tag);
                self.emit(messages).await;
            }
        }
    }

    async fn handle_desired_delete(
        &self,
        desired: &DesiredLrp,
    ) {
        for key in routing_keys_from_desired(desired) {
            let messages = self.table.remove_routes(&key, &desired.modification_tag);
            self.emit(messages).await;
        }
    }

    async fn handle_actual_create(
        &self,
        actual: &ActualLrp,
    ) {
        for (key, endpoint) in endpoints_from_actual(actual) {
            let messages = self.table.add_endpoint(&key, endpoint);
            self.emit(messages).await;
        }
    }

    async fn handle_actual_change(
        &self,
        before: &ActualLrp,
        after: &ActualLrp,
    ) {
        if after.state == ActualLrpState::Running {
            // Covers both a fresh start and a running-to-running update; the
            // table's tag check sorts out replacement.
            for (key, endpoint) in endpoints_from_actual(after) {
                let messages = self.table.add_endpoint(&key, endpoint);
                self.emit(messages).await;
            }
        } else if before.state == ActualLrpState::Running {
            for (key, endpoint) in endpoints_from_actual(before) {
                let messages = self.table.remove_endpoint(&key, &endpoint);
                self.emit(messages).await;
            }
        }
    }

    async fn handle_actual_delete(
        &self,
        actual: &ActualLrp,
    ) {
        for (key, endpoint) in endpoints_from_actual(actual) {
            let messages = self.table.remove_endpoint(&key, &endpoint);
            self.emit(messages).await;
        }
    }

    async fn emit(
        &self,
        messages: MessagesToEmit,
    ) {
        if messages.is_empty() {
            return;
        }

        ROUTES_REGISTERED.inc_by(messages.registration_count() as u64);
        ROUTES_UNREGISTERED.inc_by(messages.unregistration_count() as u64);

        if let Err(err) = self.emitter.emit(&messages).await {
            warn!("[Watcher] emit failed: {err}");
        }
    }
}

/// Resolves with the next stream item, or never while unsubscribed.
async fn next_event(event_source: &mut Option<Box<dyn EventSource>>) -> Result<Event> {
    match event_source {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}

/// Resolves at the scheduled resubscription time, or never when none is
/// scheduled.
async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
