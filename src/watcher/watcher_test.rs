use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use super::*;
use crate::routing_table::RoutingTable;
use crate::scheduler::MockSchedulerClient;
use crate::syncer::sync_event_bus;
use crate::test_utils::actual_lrp;
use crate::test_utils::desired_lrp;
use crate::test_utils::endpoint;
use crate::test_utils::modification_tag;
use crate::test_utils::routes;
use crate::test_utils::routing_key;
use crate::test_utils::FakeEmitter;
use crate::test_utils::FakeEventStream;

struct Harness {
    table: Arc<RoutingTable>,
    emitter: Arc<FakeEmitter>,
    stream: FakeEventStream,
    begin: mpsc::Sender<()>,
    end: mpsc::Sender<()>,
    subscribe_calls: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl Harness {
    /// Runs one begin/end rendezvous, as the syncer would around a snapshot.
    async fn sync_cycle(&self) {
        self.begin.send(()).await.expect("begin signal");
        self.end.send(()).await.expect("end signal");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

fn spawn_watcher() -> Harness {
    let stream = FakeEventStream::new();
    let subscribe_calls = Arc::new(AtomicUsize::new(0));

    let mut scheduler = MockSchedulerClient::new();
    let stream_for_mock = stream.clone();
    let calls_for_mock = subscribe_calls.clone();
    scheduler.expect_subscribe_to_events().returning(move || {
        calls_for_mock.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(stream_for_mock.source()) as Box<dyn crate::scheduler::EventSource>)
    });

    let table = Arc::new(RoutingTable::new());
    let emitter = Arc::new(FakeEmitter::new());
    let (events, signals) = sync_event_bus();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let watcher = Watcher::new(Arc::new(scheduler), table.clone(), emitter.clone(), signals, shutdown_rx);
    let handle = tokio::spawn(async move {
        let _ = watcher.run().await;
    });

    Harness {
        table,
        emitter,
        stream,
        begin: events.begin,
        end: events.end,
        subscribe_calls,
        shutdown_tx,
        handle,
    }
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_the_first_sync_before_subscribing() {
    let harness = spawn_watcher();

    harness.settle().await;
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 0);

    harness.sync_cycle().await;
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 1);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_desired_create_sets_routes_and_emits() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 8080);
    let instance = endpoint("ig-1", "1.1.1.1", 11, 8080);
    harness.table.add_endpoint(&key, instance.clone());
    harness.sync_cycle().await;

    harness
        .stream
        .send(Event::DesiredLrpCreated(desired_lrp("pg-1", &[8080], &[(8080, &["route-1", "route-2"])], "lg-1")));
    harness.emitter.wait_for_emit_count(1).await;

    let emitted = harness.emitter.emitted();
    assert_eq!(emitted[0].registrations.len(), 1);
    assert_eq!(
        emitted[0].registrations[0].uris,
        vec!["route-1".to_string(), "route-2".to_string()]
    );
    assert_eq!(harness.table.route_count(), 2);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_desired_create_registers_each_exposed_port() {
    let harness = spawn_watcher();
    harness.table.add_endpoint(&routing_key("pg-1", 11), endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.table.add_endpoint(&routing_key("pg-1", 22), endpoint("ig-1", "1.1.1.1", 22000, 22));
    harness.sync_cycle().await;

    harness.stream.send(Event::DesiredLrpCreated(desired_lrp(
        "pg-1",
        &[11, 22],
        &[(11, &["route-1"]), (22, &["additional-1"])],
        "lg-1",
    )));
    harness.emitter.wait_for_emit_count(2).await;

    assert_eq!(harness.table.route_count(), 2);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_desired_change_removes_keys_the_change_no_longer_carries() {
    let harness = spawn_watcher();
    let old_key = routing_key("pg-1", 11);
    let instance = endpoint("ig-1", "1.1.1.1", 11000, 11);
    harness.table.add_endpoint(&old_key, instance.clone());
    harness
        .table
        .set_routes(&old_key, crate::test_utils::tagged_routes(&["route-1"], "lg-1", modification_tag("abcd", 0)));
    harness.sync_cycle().await;

    let before = desired_lrp("pg-1", &[11], &[(11, &["route-1"])], "lg-1");
    let mut after = desired_lrp("pg-1", &[22], &[(22, &["route-2"])], "lg-1");
    after.modification_tag = modification_tag("abcd", 1);
    harness.stream.send(Event::DesiredLrpChanged { before, after });
    harness.emitter.wait_for_emit_count(1).await;

    let emitted = harness.emitter.emitted();
    assert_eq!(emitted[0].unregistrations.len(), 1);
    assert_eq!(emitted[0].unregistrations[0].uris, vec!["route-1".to_string()]);
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_create_in_running_state_adds_each_port_mapping() {
    let harness = spawn_watcher();
    harness.table.set_routes(&routing_key("pg-1", 11), routes(&["route-1"], "lg-1"));
    harness.table.set_routes(&routing_key("pg-1", 22), routes(&["additional-1"], "lg-1"));
    harness.sync_cycle().await;

    harness.stream.send(Event::ActualLrpCreated(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11), (22000, 22)],
        ActualLrpState::Running,
    )));
    harness.emitter.wait_for_emit_count(2).await;

    assert_eq!(harness.table.route_count(), 2);
    let emitted = harness.emitter.emitted();
    assert!(emitted.iter().all(|messages| messages.unregistrations.is_empty()));

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_create_in_other_states_is_ignored() {
    let harness = spawn_watcher();
    harness.table.set_routes(&routing_key("pg-1", 11), routes(&["route-1"], "lg-1"));
    harness.sync_cycle().await;

    harness.stream.send(Event::ActualLrpCreated(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11)],
        ActualLrpState::Unclaimed,
    )));
    harness.settle().await;

    assert_eq!(harness.emitter.emit_count(), 0);
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_change_into_running_adds_endpoints() {
    let harness = spawn_watcher();
    harness.table.set_routes(&routing_key("pg-1", 11), routes(&["route-1"], "lg-1"));
    harness.sync_cycle().await;

    let before = actual_lrp("pg-1", "ig-1", "", &[], ActualLrpState::Claimed);
    let after = actual_lrp("pg-1", "ig-1", "1.1.1.1", &[(11000, 11)], ActualLrpState::Running);
    harness.stream.send(Event::ActualLrpChanged { before, after });
    harness.emitter.wait_for_emit_count(1).await;

    assert_eq!(harness.table.route_count(), 1);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_change_away_from_running_removes_endpoints() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    let before = actual_lrp("pg-1", "ig-1", "1.1.1.1", &[(11000, 11)], ActualLrpState::Running);
    let after = actual_lrp("pg-1", "ig-1", "", &[], ActualLrpState::Crashed);
    harness.stream.send(Event::ActualLrpChanged { before, after });
    harness.emitter.wait_for_emit_count(1).await;

    let emitted = harness.emitter.emitted();
    assert_eq!(emitted[0].unregistrations.len(), 1);
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_change_between_non_running_states_is_a_noop() {
    let harness = spawn_watcher();
    harness.sync_cycle().await;

    let before = actual_lrp("pg-1", "ig-1", "", &[], ActualLrpState::Unclaimed);
    let after = actual_lrp("pg-1", "ig-1", "", &[], ActualLrpState::Claimed);
    harness.stream.send(Event::ActualLrpChanged { before, after });
    harness.settle().await;

    assert_eq!(harness.emitter.emit_count(), 0);
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_remove_in_running_state_removes_endpoints() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    harness.stream.send(Event::ActualLrpRemoved(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11)],
        ActualLrpState::Running,
    )));
    harness.emitter.wait_for_emit_count(1).await;

    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_actual_remove_in_other_states_is_ignored() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    harness.stream.send(Event::ActualLrpRemoved(actual_lrp(
        "pg-1",
        "ig-1",
        "",
        &[(11000, 11)],
        ActualLrpState::Crashed,
    )));
    harness.settle().await;

    assert_eq!(harness.emitter.emit_count(), 0);
    assert_eq!(harness.table.route_count(), 1);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_events_are_dropped() {
    let harness = spawn_watcher();
    harness.sync_cycle().await;

    harness.stream.send(Event::Unrecognized {
        event_type: "unrecognized-event".to_string(),
    });
    harness.settle().await;

    assert_eq!(harness.emitter.emit_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_events_during_a_sync_are_buffered_until_the_swap() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    // A second sync starts; its snapshot fetch is still in flight.
    harness.begin.send(()).await.expect("begin signal");
    harness.stream.send(Event::ActualLrpRemoved(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11)],
        ActualLrpState::Running,
    )));
    harness.settle().await;

    assert_eq!(harness.table.route_count(), 1, "event must not apply mid-sync");
    assert_eq!(harness.emitter.emit_count(), 0);

    harness.end.send(()).await.expect("end signal");
    harness.emitter.wait_for_emit_count(1).await;
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_extra_sync_signals_while_buffering_are_ignored() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    harness.begin.send(()).await.expect("begin signal");
    harness.begin.send(()).await.expect("second begin signal");
    harness.stream.send(Event::ActualLrpRemoved(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11)],
        ActualLrpState::Running,
    )));
    harness.end.send(()).await.expect("end signal");
    harness.emitter.wait_for_emit_count(1).await;

    assert_eq!(harness.emitter.emit_count(), 1);
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_buffered_events_replay_in_arrival_order() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.sync_cycle().await;

    harness.begin.send(()).await.expect("begin signal");
    let created = actual_lrp("pg-1", "ig-1", "1.1.1.1", &[(11000, 11)], ActualLrpState::Running);
    harness.stream.send(Event::ActualLrpCreated(created.clone()));
    harness.stream.send(Event::ActualLrpRemoved(created));
    harness.end.send(()).await.expect("end signal");
    harness.emitter.wait_for_emit_count(2).await;

    // Add then remove: the endpoint must be gone again.
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_resubscribes_after_stream_errors_with_backoff() {
    let harness = spawn_watcher();
    harness.sync_cycle().await;
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 1);

    harness.stream.send_error();
    harness.settle().await;
    assert_eq!(harness.stream.closed_sources(), 1);
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 1, "first retry waits out the backoff");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 2);

    // A second failure doubles the wait.
    harness.stream.send_error();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 2);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(harness.subscribe_calls.load(Ordering::SeqCst), 3);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stream_errors_do_not_lose_the_buffering_state() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    harness.begin.send(()).await.expect("begin signal");
    harness.stream.send_error();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Resubscribed mid-sync; events still buffer until the swap completes.
    harness.stream.send(Event::ActualLrpRemoved(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11)],
        ActualLrpState::Running,
    )));
    harness.settle().await;
    assert_eq!(harness.table.route_count(), 1);

    harness.end.send(()).await.expect("end signal");
    harness.emitter.wait_for_emit_count(1).await;
    assert_eq!(harness.table.route_count(), 0);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_buffered_events() {
    let harness = spawn_watcher();
    let key = routing_key("pg-1", 11);
    harness.table.set_routes(&key, routes(&["route-1"], "lg-1"));
    harness.table.add_endpoint(&key, endpoint("ig-1", "1.1.1.1", 11000, 11));
    harness.sync_cycle().await;

    harness.begin.send(()).await.expect("begin signal");
    harness.stream.send(Event::ActualLrpRemoved(actual_lrp(
        "pg-1",
        "ig-1",
        "1.1.1.1",
        &[(11000, 11)],
        ActualLrpState::Running,
    )));
    harness.settle().await;

    let _ = harness.shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(1), harness.handle)
        .await
        .expect("watcher should stop promptly")
        .expect("watcher task should not panic");

    assert_eq!(harness.table.route_count(), 1, "buffered events are discarded, not applied");
}
