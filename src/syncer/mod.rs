//! Periodic reconciliation against the scheduler and the router heartbeat.
//!
//! Owns all wall-clock timing: the full-sync period from configuration and
//! the heartbeat period learned from the router at runtime.


use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::SyncConfig;
use crate::constants::ROUTER_GREET_SUBJECT;
use crate::constants::ROUTER_START_SUBJECT;
use crate::metrics::ROUTES_SYNCED;
use crate::metrics::ROUTES_TOTAL;
use crate::metrics::ROUTE_EMITTER_SYNC_DURATION;
use crate::nats::Emitter;
use crate::nats::NatsClient;
use crate::nats::NatsMessage;
use crate::routing_table::endpoints_by_routing_key;
use crate::routing_table::routes_by_routing_key;
use crate::routing_table::MessagesToEmit;
use crate::routing_table::RoutingTable;
use crate::scheduler::ActualLrp;
use crate::scheduler::DesiredLrp;
use crate::scheduler::SchedulerClient;
use crate::Result;

/// Sender half of the syncer-watcher rendezvous. Signals are fired with
/// `try_send`: a signal that finds the slot occupied is dropped rather than
/// queued.
pub struct SyncEvents {
    pub begin: mpsc::Sender<()>,
    pub end: mpsc::Sender<()>,
}

/// Receiver half, held by the watcher.
pub struct SyncSignals {
    pub begin: mpsc::Receiver<()>,
    pub end: mpsc::Receiver<()>,
}

/// The two rendezvous points coordinating the syncer and the watcher:
/// sync-begin (start buffering) and sync-end (replay against the swapped
/// table).
pub fn sync_event_bus() -> (SyncEvents, SyncSignals) {
    let (begin_tx, begin_rx) = mpsc::channel(1);
    let (end_tx, end_rx) = mpsc::channel(1);
    (
        SyncEvents {
            begin: begin_tx,
            end: end_tx,
        },
        SyncSignals {
            begin: begin_rx,
            end: end_rx,
        },
    )
}

/// Payload of `router.start` broadcasts and greet replies.
#[derive(Debug, Deserialize)]
struct RouterGreeting {
    #[serde(rename = "minimumRegisterIntervalInSeconds")]
    minimum_register_interval_in_seconds: u64,
}

pub struct Syncer<S, E, N>
where
    S: SchedulerClient,
    E: Emitter,
    N: NatsClient,
{
    scheduler: Arc<S>,
    table: Arc<RoutingTable>,
    emitter: Arc<E>,
    nats: Arc<N>,
    sync_interval: Duration,
    greet_interval: Duration,
    sync_events: SyncEvents,

    // Shutdown signal
    shutdown_signal: watch::Receiver<()>,
}

impl<S, E, N> Syncer<S, E, N>
where
    S: SchedulerClient,
    E: Emitter,
    N: NatsClient,
{
    pub fn new(
        scheduler: Arc<S>,
        table: Arc<RoutingTable>,
        emitter: Arc<E>,
        nats: Arc<N>,
        settings: &SyncConfig,
        sync_events: SyncEvents,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            scheduler,
            table,
            emitter,
            nats,
            sync_interval: settings.sync_interval(),
            greet_interval: settings.greet_interval(),
            sync_events,
            shutdown_signal,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut shutdown_signal = self.shutdown_signal.clone();

        info!("[Syncer] starting; performing initial sync");
        tokio::select! {
            _ = shutdown_signal.changed() => {
                warn!("[Syncer] shutdown signal received; abandoning initial sync.");
                return Ok(());
            }
            _ = self.sync() => {}
        }

        let mut router_start_rx = self.nats.subscribe(ROUTER_START_SUBJECT).await?;
        let greet_inbox = self.nats.new_inbox();
        let mut greet_reply_rx = self.nats.subscribe(&greet_inbox).await?;

        let mut sync_timer = interval_at(Instant::now() + self.sync_interval, self.sync_interval);
        sync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut greet_timer = interval(self.greet_interval);
        greet_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut heartbeat_timer: Option<Interval> = None;

        loop {
            let awaiting_interval = heartbeat_timer.is_none();

            tokio::select! {
                _ = shutdown_signal.changed() => {
                    warn!("[Syncer] shutdown signal received.");
                    return Ok(());
                }

                _ = sync_timer.tick() => {
                    // A shutdown arriving mid-fetch abandons the cycle; the
                    // table is never swapped with partial data.
                    tokio::select! {
                        _ = shutdown_signal.changed() => {
                            warn!("[Syncer] shutdown signal received; abandoning sync cycle.");
                            return Ok(());
                        }
                        _ = self.sync() => {}
                    }
                }

                _ = greet_timer.tick(), if awaiting_interval => {
                    debug!("[Syncer] greeting router");
                    if let Err(err) = self
                        .nats
                        .publish_with_reply(ROUTER_GREET_SUBJECT, &greet_inbox, Vec::new())
                        .await
                    {
                        warn!("[Syncer] greet publish failed: {err}");
                    }
                }

                Some(message) = router_start_rx.recv() => {
                    self.handle_router_greeting(&message, &mut heartbeat_timer).await;
                }

                Some(message) = greet_reply_rx.recv() => {
                    self.handle_router_greeting(&message, &mut heartbeat_timer).await;
                }

                _ = tick_heartbeat(&mut heartbeat_timer) => {
                    self.emit_heartbeat().await;
                }
            }
        }
    }

    /// The full sync procedure: signal the watcher, fetch both snapshots,
    /// swap, emit the diff. A failed fetch skips the cycle without touching
    /// the table; the next tick retries.
    async fn sync(&self) {
        debug!("[Syncer] full sync started");
        let started = Instant::now();

        if self.sync_events.begin.try_send(()).is_err() {
            debug!("[Syncer] sync-begin signal dropped; a sync is already being observed");
        }

        match self.fetch_routing_snapshot().await {
            Ok((desireds, actuals)) => {
                let temp_table = RoutingTable::from_snapshot(
                    routes_by_routing_key(&desireds),
                    endpoints_by_routing_key(&actuals),
                );
                let messages = self.table.swap(temp_table);
                self.emit(&messages).await;
                ROUTE_EMITTER_SYNC_DURATION.set(started.elapsed().as_secs_f64());
            }
            Err(err) => {
                warn!("[Syncer] snapshot fetch failed, keeping table for this cycle: {err}");
            }
        }

        if self.sync_events.end.try_send(()).is_err() {
            debug!("[Syncer] sync-end signal dropped");
        }
    }

    async fn fetch_routing_snapshot(&self) -> Result<(Vec<DesiredLrp>, Vec<ActualLrp>)> {
        let desireds = self.scheduler.desired_lrps().await?;
        let actuals = self.scheduler.actual_lrps().await?;
        Ok((desireds, actuals))
    }

    /// Re-announces every current binding so the router does not time it out.
    async fn emit_heartbeat(&self) {
        let messages = self.table.messages_to_emit();
        self.emit(&messages).await;
    }

    async fn emit(
        &self,
        messages: &MessagesToEmit,
    ) {
        ROUTES_SYNCED.inc_by(messages.registration_count() as u64);
        ROUTES_TOTAL.set(self.table.route_count() as i64);

        if let Err(err) = self.emitter.emit(messages).await {
            warn!("[Syncer] emit failed: {err}");
        }
    }

    async fn handle_router_greeting(
        &self,
        message: &NatsMessage,
        heartbeat_timer: &mut Option<Interval>,
    ) {
        match serde_json::from_slice::<RouterGreeting>(&message.payload) {
            Ok(greeting) => {
                let period = Duration::from_secs(greeting.minimum_register_interval_in_seconds);
                info!("[Syncer] router declared heartbeat interval {period:?}");

                // Announce right away; the timer then follows the new period.
                self.emit_heartbeat().await;

                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *heartbeat_timer = Some(timer);
            }
            Err(err) => {
                warn!("[Syncer] malformed router greeting on {}: {err}", message.subject);
            }
        }
    }
}

/// Resolves on the next heartbeat tick, or never while the interval is still
/// unknown.
async fn tick_heartbeat(heartbeat_timer: &mut Option<Interval>) {
    match heartbeat_timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
