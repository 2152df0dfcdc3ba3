//! End-to-end alarm flows over the in-memory broker
//!
//! Drives the status listener, command publisher and eligibility gate
//! together the way the service wires them.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use alarm_core::{
    AlarmCommander, AlarmError, AlarmStateMachine, AlarmStatus, Broker, EligibilityGate,
    MemoryBroker, MemorySleepStore, RetryPolicy, SleepRatingService, SleepStore,
    SqliteSleepStore, StatusListener,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const STATUS_TOPIC: &str = "alarm/status";
const TIME_TOPIC: &str = "alarm/time";
const RESET_DELAY: Duration = Duration::from_secs(10);

struct Harness {
    broker: Arc<MemoryBroker>,
    store: Arc<MemorySleepStore>,
    machine: AlarmStateMachine,
    commander: AlarmCommander,
    token: CancellationToken,
    listener: JoinHandle<alarm_core::Result<()>>,
}

fn start(reset_delay: Duration, retry: RetryPolicy) -> Harness {
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(MemorySleepStore::new());
    let machine = AlarmStateMachine::new(reset_delay);
    let commander = AlarmCommander::new(broker.clone(), TIME_TOPIC, machine.clone());
    let token = CancellationToken::new();
    let listener = StatusListener::new(broker.clone(), STATUS_TOPIC, machine.clone(), store.clone())
        .with_retry(retry)
        .spawn(token.clone());

    Harness {
        broker,
        store,
        machine,
        commander,
        token,
        listener,
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        max_retries,
    }
}

async fn wait_subscribed(broker: &MemoryBroker) {
    for _ in 0..10_000 {
        if broker.subscriber_count(STATUS_TOPIC) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("listener never subscribed");
}

async fn send_status(broker: &MemoryBroker, payload: &str) {
    broker
        .publish(STATUS_TOPIC, Bytes::copy_from_slice(payload.as_bytes()))
        .await
        .unwrap();
}

async fn settle(machine: &AlarmStateMachine, expected: AlarmStatus) {
    for _ in 0..10_000 {
        if machine.snapshot() == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(machine.snapshot(), expected);
}

#[tokio::test(start_paused = true)]
async fn status_event_updates_flags() {
    let h = start(RESET_DELAY, RetryPolicy::default());
    wait_subscribed(&h.broker).await;

    send_status(&h.broker, r#"{"active": true, "triggered": false}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: false,
        },
    )
    .await;

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn trigger_auto_resets_after_delay() {
    let h = start(RESET_DELAY, RetryPolicy::default());
    wait_subscribed(&h.broker).await;

    send_status(&h.broker, r#"{"active": true, "triggered": true}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: true,
        },
    )
    .await;

    tokio::time::sleep(RESET_DELAY - Duration::from_millis(100)).await;
    assert!(h.machine.snapshot().triggered);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        h.machine.snapshot(),
        AlarmStatus {
            armed: true,
            triggered: false,
        }
    );

    let record = h
        .store
        .get_record(alarm_core::store::today())
        .await
        .unwrap()
        .unwrap();
    assert!(record.alarm_fired);

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn arm_zero_cancels_from_any_state() {
    let h = start(RESET_DELAY, RetryPolicy::default());
    wait_subscribed(&h.broker).await;

    h.commander.arm(30).await.unwrap();
    send_status(&h.broker, r#"{"active": true, "triggered": true}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: true,
        },
    )
    .await;

    h.commander.arm(0).await.unwrap();
    assert_eq!(h.machine.snapshot(), AlarmStatus::default());
    assert_eq!(
        h.broker.published(TIME_TOPIC),
        vec![Bytes::from_static(b"30"), Bytes::from_static(b"0")]
    );

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_does_not_stop_listener() {
    let h = start(RESET_DELAY, RetryPolicy::default());
    wait_subscribed(&h.broker).await;

    send_status(&h.broker, "{broken").await;
    send_status(&h.broker, "off").await;
    send_status(&h.broker, r#"{"active": true}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: false,
        },
    )
    .await;
    assert!(!h.listener.is_finished());

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn listener_resubscribes_after_drop() {
    let h = start(RESET_DELAY, fast_retry(5));
    wait_subscribed(&h.broker).await;

    h.broker.drop_subscriptions();
    assert_eq!(h.broker.subscriber_count(STATUS_TOPIC), 0);
    wait_subscribed(&h.broker).await;

    send_status(&h.broker, r#"{"active": true, "triggered": true}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: true,
        },
    )
    .await;

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn recovered_outages_do_not_exhaust_retry_budget() {
    let h = start(RESET_DELAY, fast_retry(2));

    // Quiet topic between outages: no payloads ever arrive
    for _ in 0..5 {
        wait_subscribed(&h.broker).await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        h.broker.drop_subscriptions();
    }
    wait_subscribed(&h.broker).await;
    assert!(!h.listener.is_finished());

    send_status(&h.broker, r#"{"active": true}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: false,
        },
    )
    .await;

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn listener_gives_up_after_retry_budget() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_connected(false);
    let machine = AlarmStateMachine::new(RESET_DELAY);
    let store = Arc::new(MemorySleepStore::new());

    let result = StatusListener::new(broker, STATUS_TOPIC, machine, store)
        .with_retry(fast_retry(3))
        .run(CancellationToken::new())
        .await;

    match result {
        Err(AlarmError::RetryBudgetExhausted { topic, attempts }) => {
            assert_eq!(topic, STATUS_TOPIC);
            assert_eq!(attempts, 4);
        },
        other => panic!("expected retry budget error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_pending_reset() {
    let h = start(RESET_DELAY, RetryPolicy::default());
    wait_subscribed(&h.broker).await;

    send_status(&h.broker, r#"{"active": true, "triggered": true}"#).await;
    settle(
        &h.machine,
        AlarmStatus {
            armed: true,
            triggered: true,
        },
    )
    .await;

    h.token.cancel();
    h.listener.await.unwrap().unwrap();
    assert_eq!(h.broker.subscriber_count(STATUS_TOPIC), 0);

    tokio::time::sleep(RESET_DELAY * 2).await;
    assert!(h.machine.snapshot().triggered);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_arm_and_trigger_never_tear() {
    let reset_delay = Duration::from_millis(50);

    for _ in 0..20 {
        let h = start(reset_delay, RetryPolicy::default());
        wait_subscribed(&h.broker).await;

        let first = h.commander.clone();
        let second = h.commander.clone();
        let broker = h.broker.clone();
        let (a, b, c) = tokio::join!(
            tokio::spawn(async move { first.arm(30).await }),
            tokio::spawn(async move { second.arm(30).await }),
            tokio::spawn(async move {
                send_status(&broker, r#"{"active": true, "triggered": true}"#).await
            }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();
        c.unwrap();

        // Either the trigger or an arm wrote last; armed is true both ways
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.machine.snapshot().armed);

        // Every surviving trigger owns a reset, so nothing stale outlives it
        tokio::time::sleep(reset_delay * 4).await;
        assert_eq!(
            h.machine.snapshot(),
            AlarmStatus {
                armed: true,
                triggered: false,
            }
        );

        h.token.cancel();
        h.listener.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn rating_gate_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smart_alarm.db");
    let store: Arc<dyn SleepStore> = Arc::new(
        SqliteSleepStore::connect(path.to_str().unwrap(), 2)
            .await
            .unwrap(),
    );
    let gate = EligibilityGate::new(store.clone());
    let ratings = SleepRatingService::new(store.clone());

    assert!(gate.can_rate_today().await.unwrap());
    store
        .mark_alarm_fired(alarm_core::store::today())
        .await
        .unwrap();
    assert!(gate.can_rate_today().await.unwrap());

    ratings.submit(8).await.unwrap();
    assert!(!gate.can_rate_today().await.unwrap());

    // A late trigger on the same day keeps the gate closed
    store
        .mark_alarm_fired(alarm_core::store::today())
        .await
        .unwrap();
    assert!(!gate.can_rate_today().await.unwrap());
}
