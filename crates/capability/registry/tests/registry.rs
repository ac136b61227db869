use async_trait::async_trait;
use domain::{
    DeviceId, DeviceRecord, DeviceState, StatusPayload, Thresholds, Timestamp, TransitionEvent,
};
use dsr_registry::{
    ChannelListener, DeliveryError, DeviceRegistry, EventListener, LateReportPolicy, ManualClock,
    RegistryConfig, RegistryError, StalenessStrategy,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn config() -> RegistryConfig {
    RegistryConfig {
        thresholds: Thresholds {
            stale_after: Duration::from_secs(5),
            offline_after: Duration::from_secs(15),
        },
        ..RegistryConfig::default()
    }
}

fn registry_with(config: RegistryConfig) -> (DeviceRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
    let registry = DeviceRegistry::new(config, clock.clone()).expect("registry");
    (registry, clock)
}

fn payload(value: serde_json::Value) -> StatusPayload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<TransitionEvent>) -> TransitionEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

async fn assert_no_event(rx: &mut mpsc::Receiver<TransitionEvent>) {
    let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(waited.is_err(), "unexpected event: {:?}", waited);
}

#[tokio::test]
async fn lifecycle_emits_one_event_per_transition() {
    let (registry, clock) = registry_with(config());
    let (listener, mut rx) = ChannelListener::channel(16);
    registry.subscribe(Arc::new(listener)).expect("subscribe");

    let ack = registry
        .report("sensor-1", payload(json!({"battery": 90})), None)
        .expect("report");
    assert!(ack.applied);
    assert_eq!(ack.state, DeviceState::Online);
    let event = next_event(&mut rx).await;
    assert_eq!(event.from, None);
    assert_eq!(event.to, DeviceState::Online);

    clock.set(Timestamp::from_secs(6));
    assert_eq!(registry.sweep_once().expect("sweep").marked_stale, 1);
    let event = next_event(&mut rx).await;
    assert_eq!((event.from, event.to), (Some(DeviceState::Online), DeviceState::Stale));
    assert_eq!(event.at, Timestamp::from_secs(6));

    clock.set(Timestamp::from_secs(16));
    assert_eq!(registry.sweep_once().expect("sweep").marked_offline, 1);
    let event = next_event(&mut rx).await;
    assert_eq!((event.from, event.to), (Some(DeviceState::Stale), DeviceState::Offline));
    assert_eq!(
        registry.query("sensor-1").expect("query").state,
        DeviceState::Offline
    );

    clock.set(Timestamp::from_secs(20));
    registry
        .report("sensor-1", payload(json!({"battery": 80})), None)
        .expect("report");
    let event = next_event(&mut rx).await;
    assert_eq!((event.from, event.to), (Some(DeviceState::Offline), DeviceState::Online));
    assert!(event.is_recovery());
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn no_op_reports_and_sweeps_emit_nothing() {
    let (registry, clock) = registry_with(config());
    let (listener, mut rx) = ChannelListener::channel(16);
    registry.subscribe(Arc::new(listener)).expect("subscribe");

    registry.report("a", StatusPayload::new(), None).expect("report");
    next_event(&mut rx).await;

    clock.set(Timestamp::from_secs(2));
    registry.report("a", StatusPayload::new(), None).expect("report");
    clock.set(Timestamp::from_secs(4));
    let report = registry.sweep_once().expect("sweep");
    assert_eq!(report.examined, 1);
    assert_eq!(report.transitions(), 0);
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn late_report_keeps_state_and_last_seen() {
    let (registry, _clock) = registry_with(config());
    registry
        .report("a", payload(json!({"seq": 2})), Some(Timestamp::from_secs(10)))
        .expect("report");

    let ack = registry
        .report("a", payload(json!({"seq": 1})), Some(Timestamp::from_secs(3)))
        .expect("late report is not an error");
    assert!(!ack.applied);
    assert!(ack.transition.is_none());

    let record = registry.query("a").expect("query");
    assert_eq!(record.last_seen_at, Timestamp::from_secs(10));
    assert_eq!(record.last_payload, Some(payload(json!({"seq": 2}))));
}

#[tokio::test]
async fn merge_policy_replaces_payload_only() {
    let (registry, _clock) = registry_with(RegistryConfig {
        late_report_policy: LateReportPolicy::MergePayload,
        ..config()
    });
    registry
        .report("a", payload(json!({"seq": 2})), Some(Timestamp::from_secs(10)))
        .expect("report");
    let ack = registry
        .report("a", payload(json!({"seq": 1})), Some(Timestamp::from_secs(3)))
        .expect("report");
    assert!(!ack.applied);

    let record = registry.query("a").expect("query");
    assert_eq!(record.last_seen_at, Timestamp::from_secs(10));
    assert_eq!(record.last_payload, Some(payload(json!({"seq": 1}))));
}

#[tokio::test]
async fn increasing_reports_keep_latest_payload() {
    let (registry, _clock) = registry_with(config());
    for seq in 1..=20u64 {
        registry
            .report("a", payload(json!({"seq": seq})), Some(Timestamp::from_secs(seq)))
            .expect("report");
    }
    let record = registry.query("a").expect("query");
    assert_eq!(record.last_payload, Some(payload(json!({"seq": 20}))));
    assert_eq!(record.created_at, Timestamp::from_secs(1));
}

#[tokio::test]
async fn query_errors() {
    let (registry, _clock) = registry_with(config());
    assert!(matches!(
        registry.query("missing"),
        Err(RegistryError::NotFound(id)) if id.as_str() == "missing"
    ));
    assert!(matches!(
        registry.report("   ", StatusPayload::new(), None),
        Err(RegistryError::InvalidDeviceId(_))
    ));
}

#[tokio::test]
async fn invalid_configuration_refuses_to_build() {
    let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
    let result = DeviceRegistry::new(
        RegistryConfig {
            thresholds: Thresholds {
                stale_after: Duration::from_secs(20),
                offline_after: Duration::from_secs(10),
            },
            ..RegistryConfig::default()
        },
        clock,
    );
    assert!(matches!(result, Err(RegistryError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn list_counts_every_reported_device() {
    let (registry, clock) = registry_with(config());
    for id in ["c", "a", "b"] {
        registry.report(id, StatusPayload::new(), None).expect("report");
    }
    clock.set(Timestamp::from_secs(6));
    registry.sweep_once().expect("sweep");
    clock.set(Timestamp::from_secs(16));
    registry.sweep_once().expect("sweep");
    registry.report("d", StatusPayload::new(), None).expect("report");

    let ids: Vec<String> = registry
        .list(None)
        .expect("list")
        .map(|record| record.id.into_inner())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    assert_eq!(registry.list(Some(DeviceState::Offline)).expect("list").count(), 3);
    assert_eq!(registry.list(Some(DeviceState::Online)).expect("list").count(), 1);
    assert_eq!(registry.device_count().expect("count"), 4);
}

#[tokio::test]
async fn lazy_strategy_derives_state_without_events() {
    let (registry, clock) = registry_with(RegistryConfig {
        strategy: StalenessStrategy::Lazy,
        ..config()
    });
    let (listener, mut rx) = ChannelListener::channel(16);
    registry.subscribe(Arc::new(listener)).expect("subscribe");
    registry.report("a", StatusPayload::new(), None).expect("report");
    next_event(&mut rx).await;

    clock.set(Timestamp::from_secs(6));
    assert_eq!(registry.query("a").expect("query").state, DeviceState::Stale);
    clock.set(Timestamp::from_secs(16));
    assert_eq!(
        registry.list(Some(DeviceState::Offline)).expect("list").count(),
        1
    );
    assert!(registry.spawn_sweeper(CancellationToken::new()).is_none());
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn per_device_thresholds_override_defaults() {
    let (registry, clock) = registry_with(config());
    registry
        .configure_device(
            "slow",
            Thresholds {
                stale_after: Duration::from_secs(60),
                offline_after: Duration::from_secs(120),
            },
        )
        .expect("configure before first report");
    registry.report("slow", StatusPayload::new(), None).expect("report");
    registry.report("fast", StatusPayload::new(), None).expect("report");

    clock.set(Timestamp::from_secs(10));
    registry.sweep_once().expect("sweep");
    assert_eq!(registry.query("slow").expect("query").state, DeviceState::Online);
    assert_eq!(registry.query("fast").expect("query").state, DeviceState::Stale);

    let err = registry
        .configure_device(
            "slow",
            Thresholds {
                stale_after: Duration::ZERO,
                offline_after: Duration::from_secs(1),
            },
        )
        .expect_err("zero stale threshold");
    assert!(matches!(err, RegistryError::InvalidConfiguration(_)));

    assert!(registry.clear_device_thresholds("slow").expect("clear"));
    assert_eq!(
        registry.thresholds_for("slow").expect("thresholds"),
        config().thresholds
    );
}

#[tokio::test]
async fn history_and_status_board() {
    let (registry, clock) = registry_with(config());
    registry.report("a", StatusPayload::new(), None).expect("report");
    clock.set(Timestamp::from_secs(6));
    registry.sweep_once().expect("sweep");

    let history = registry.history("a").expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].to, DeviceState::Stale);
    assert_eq!(history[1].message, "device status changed to stale");
    assert_eq!(history[1].last_seen_at, Timestamp::ZERO);

    let status = registry.status("a").expect("status");
    assert_eq!(status.effective_state, DeviceState::Stale);
    assert_eq!(status.time_until_stale, Duration::ZERO);
    assert_eq!(status.time_until_offline, Duration::from_secs(9));
    assert_eq!(status.stale_in(), "expired");
    assert_eq!(status.offline_in(), "9s");
    assert_eq!(registry.status_board().expect("board").len(), 1);
}

#[tokio::test]
async fn purge_and_restore() {
    let (registry, _clock) = registry_with(config());
    registry.report("a", StatusPayload::new(), None).expect("report");
    let removed = registry.purge("a").expect("purge");
    assert_eq!(removed.id.as_str(), "a");
    assert!(matches!(registry.query("a"), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.history("a"), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.purge("a"), Err(RegistryError::NotFound(_))));

    let (listener, mut rx) = ChannelListener::channel(16);
    registry.subscribe(Arc::new(listener)).expect("subscribe");
    let mut offline = removed.clone();
    offline.state = DeviceState::Offline;
    let restored = registry
        .restore(vec![offline.clone(), offline])
        .expect("restore");
    assert_eq!(restored, 1);
    assert_eq!(registry.query("a").expect("query").state, DeviceState::Offline);
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn restore_clamps_future_timestamps_to_now() {
    let (registry, clock) = registry_with(config());
    clock.set(Timestamp::from_secs(10));
    let future = Timestamp::from_secs(3600);
    let mut offline = DeviceRecord::new_online(DeviceId::from("a"), None, future);
    offline.state = DeviceState::Offline;
    let online = DeviceRecord::new_online(DeviceId::from("b"), None, future);
    assert_eq!(registry.restore(vec![offline, online]).expect("restore"), 2);

    let restored = registry.query("a").expect("query");
    assert_eq!(restored.last_seen_at, Timestamp::from_secs(10));
    assert_eq!(restored.created_at, Timestamp::from_secs(10));
    assert_eq!(restored.state_changed_at, Timestamp::from_secs(10));

    let (listener, mut rx) = ChannelListener::channel(16);
    registry.subscribe(Arc::new(listener)).expect("subscribe");
    let ack = registry.report("a", StatusPayload::new(), None).expect("report");
    assert!(ack.applied);
    assert_eq!(ack.state, DeviceState::Online);
    let recovered = next_event(&mut rx).await;
    assert_eq!(recovered.from, Some(DeviceState::Offline));
    assert_eq!(recovered.to, DeviceState::Online);

    clock.advance(Duration::from_secs(16));
    registry.sweep_once().expect("sweep");
    assert_ne!(registry.query("b").expect("query").state, DeviceState::Online);
}

#[test]
fn subscribe_requires_a_runtime() {
    let (registry, _clock) = registry_with(config());
    let (listener, _rx) = ChannelListener::channel(1);
    assert!(matches!(
        registry.subscribe(Arc::new(listener)),
        Err(RegistryError::NoRuntime)
    ));
    assert_eq!(registry.subscriber_count(), 0);
    assert!(registry.spawn_sweeper(CancellationToken::new()).is_none());
    assert!(registry.report("a", StatusPayload::new(), None).expect("report").applied);
}

struct RecordingListener {
    seen: Arc<Mutex<Vec<TransitionEvent>>>,
}

#[async_trait]
impl EventListener for RecordingListener {
    async fn on_event(&self, event: &TransitionEvent) -> Result<(), DeliveryError> {
        self.seen.lock().expect("seen").push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn unsubscribed_listener_receives_nothing_further() {
    let (registry, clock) = registry_with(config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle = registry
        .subscribe(Arc::new(RecordingListener { seen: seen.clone() }))
        .expect("subscribe");

    // 当前线程运行时：事件已入队但尚未投递
    registry.report("a", StatusPayload::new(), None).expect("report");
    clock.set(Timestamp::from_secs(6));
    registry.sweep_once().expect("sweep");
    assert_eq!(registry.subscription_stats(handle).expect("stats").queued, 2);

    assert!(registry.unsubscribe(handle));
    clock.set(Timestamp::from_secs(16));
    registry.sweep_once().expect("sweep");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(seen.lock().expect("seen").is_empty());
    assert!(registry.subscription_stats(handle).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reports_for_distinct_devices() {
    let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
    let registry = DeviceRegistry::new(config(), clock.clone()).expect("registry");

    let mut tasks = Vec::new();
    for worker in 0..8u64 {
        let registry = registry.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let id = format!("device-{worker}");
            for seq in 1..=500u64 {
                registry
                    .report(&id, StatusPayload::new(), Some(Timestamp::from_millis(seq)))
                    .expect("report");
            }
        }));
    }
    tokio::time::timeout(Duration::from_secs(10), async {
        for task in tasks {
            task.await.expect("join");
        }
    })
    .await
    .expect("reports finish");

    assert_eq!(registry.device_count().expect("count"), 8);
    for record in registry.list(None).expect("list") {
        assert_eq!(record.last_seen_at, Timestamp::from_millis(500));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sweeper_runs_until_shutdown() {
    let (registry, clock) = registry_with(RegistryConfig {
        sweep_period: Duration::from_millis(5),
        ..config()
    });
    let (listener, mut rx) = ChannelListener::channel(16);
    registry.subscribe(Arc::new(listener)).expect("subscribe");
    let sweeper = registry
        .spawn_sweeper(CancellationToken::new())
        .expect("active sweep");

    registry.report("a", StatusPayload::new(), None).expect("report");
    next_event(&mut rx).await;
    clock.set(Timestamp::from_secs(6));
    let event = next_event(&mut rx).await;
    assert_eq!(event.to, DeviceState::Stale);

    registry.shutdown().await;
    tokio::time::timeout(Duration::from_secs(1), sweeper)
        .await
        .expect("sweeper stops")
        .expect("join");
    assert!(matches!(
        registry.subscribe(Arc::new(RecordingListener {
            seen: Arc::new(Mutex::new(Vec::new())),
        })),
        Err(RegistryError::ShutDown)
    ));
}
