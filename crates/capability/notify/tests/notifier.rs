use async_trait::async_trait;
use domain::{DeviceId, DeviceState, Timestamp, TransitionEvent};
use dsr_notify::{
    ChannelListener, DeliveryError, EventListener, EventNotifier, NotifierConfig, NotifyError,
    OverflowPolicy,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

fn event(device: &str, seq: u64) -> TransitionEvent {
    let to = if seq % 2 == 0 {
        DeviceState::Online
    } else {
        DeviceState::Stale
    };
    TransitionEvent {
        device_id: DeviceId::from(device),
        from: None,
        to,
        at: Timestamp::from_millis(seq),
    }
}

fn notifier(capacity: usize, overflow: OverflowPolicy) -> EventNotifier {
    EventNotifier::new(NotifierConfig {
        queue_capacity: capacity,
        overflow,
    })
}

struct FailingListener;

#[async_trait]
impl EventListener for FailingListener {
    async fn on_event(&self, _event: &TransitionEvent) -> Result<(), DeliveryError> {
        Err(DeliveryError::Listener("boom".to_string()))
    }
}

struct GatedListener {
    gate: Arc<Semaphore>,
    seen: Arc<Mutex<Vec<TransitionEvent>>>,
}

#[async_trait]
impl EventListener for GatedListener {
    async fn on_event(&self, event: &TransitionEvent) -> Result<(), DeliveryError> {
        let permit = self.gate.acquire().await.map_err(|_| DeliveryError::Closed)?;
        permit.forget();
        self.seen.lock().expect("seen").push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn delivers_in_publish_order() {
    let notifier = notifier(256, OverflowPolicy::DropOldest);
    let (listener, mut rx) = ChannelListener::channel(256);
    notifier.subscribe(Arc::new(listener)).expect("subscribe");

    for seq in 0..50 {
        assert_eq!(notifier.publish(&event("a", seq)), 1);
    }
    for seq in 0..50 {
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timely")
            .expect("event");
        assert_eq!(received.at, Timestamp::from_millis(seq));
    }
}

#[tokio::test]
async fn drop_oldest_keeps_latest_events() {
    let notifier = notifier(2, OverflowPolicy::DropOldest);
    let (listener, mut rx) = ChannelListener::channel(16);
    let handle = notifier.subscribe(Arc::new(listener)).expect("subscribe");

    // 当前线程运行时：投递任务在 await 之前不会运行
    for seq in 0..5 {
        notifier.publish(&event("a", seq));
    }
    let stats = notifier.stats(handle).expect("stats");
    assert_eq!(stats.dropped, 3);
    assert_eq!(stats.queued, 2);

    let first = rx.recv().await.expect("event");
    let second = rx.recv().await.expect("event");
    assert_eq!(first.at, Timestamp::from_millis(3));
    assert_eq!(second.at, Timestamp::from_millis(4));
}

#[tokio::test]
async fn drop_newest_keeps_queued_events() {
    let notifier = notifier(2, OverflowPolicy::DropNewest);
    let (listener, mut rx) = ChannelListener::channel(16);
    let handle = notifier.subscribe(Arc::new(listener)).expect("subscribe");

    assert_eq!(notifier.publish(&event("a", 0)), 1);
    assert_eq!(notifier.publish(&event("a", 1)), 1);
    assert_eq!(notifier.publish(&event("a", 2)), 0);
    assert_eq!(notifier.stats(handle).expect("stats").dropped, 1);

    assert_eq!(rx.recv().await.expect("event").at, Timestamp::from_millis(0));
    assert_eq!(rx.recv().await.expect("event").at, Timestamp::from_millis(1));
}

#[tokio::test]
async fn failing_listener_does_not_affect_others() {
    let notifier = notifier(16, OverflowPolicy::DropOldest);
    let failing = notifier
        .subscribe(Arc::new(FailingListener))
        .expect("subscribe");
    let (listener, mut rx) = ChannelListener::channel(16);
    notifier.subscribe(Arc::new(listener)).expect("subscribe");

    for seq in 0..3 {
        assert_eq!(notifier.publish(&event("a", seq)), 2);
    }
    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timely")
            .expect("event");
    }

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if notifier.stats(failing).expect("stats").failed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("failures counted");
    assert_eq!(notifier.stats(failing).expect("stats").delivered, 0);
}

#[tokio::test]
async fn unsubscribe_discards_queued_and_in_flight_events() {
    let notifier = notifier(16, OverflowPolicy::DropOldest);
    let gate = Arc::new(Semaphore::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle = notifier
        .subscribe(Arc::new(GatedListener {
            gate: gate.clone(),
            seen: seen.clone(),
        }))
        .expect("subscribe");

    for seq in 0..3 {
        notifier.publish(&event("a", seq));
    }
    // 让投递任务取出第一条并阻塞在闸门上
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    assert!(notifier.unsubscribe(handle));
    assert!(!notifier.unsubscribe(handle));
    assert!(notifier.stats(handle).is_none());
    gate.add_permits(10);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(seen.lock().expect("seen").is_empty());
    assert_eq!(notifier.subscriber_count(), 0);
}

#[tokio::test]
async fn shutdown_drains_queued_events() {
    let notifier = notifier(16, OverflowPolicy::DropOldest);
    let (listener, mut rx) = ChannelListener::channel(16);
    notifier.subscribe(Arc::new(listener)).expect("subscribe");
    for seq in 0..3 {
        notifier.publish(&event("a", seq));
    }

    notifier.shutdown(Duration::from_secs(1)).await;

    let mut received = Vec::new();
    while let Some(event) = rx.recv().await {
        received.push(event.at.as_millis());
    }
    assert_eq!(received, vec![0, 1, 2]);
    assert!(notifier.is_closed());
    assert_eq!(notifier.publish(&event("a", 9)), 0);
    assert!(matches!(
        notifier.subscribe(Arc::new(FailingListener)),
        Err(NotifyError::Closed)
    ));
}

#[tokio::test]
async fn shutdown_cancels_stuck_listener_after_grace() {
    let notifier = notifier(16, OverflowPolicy::DropOldest);
    let gate = Arc::new(Semaphore::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    notifier
        .subscribe(Arc::new(GatedListener {
            gate: gate.clone(),
            seen: seen.clone(),
        }))
        .expect("subscribe");
    notifier.publish(&event("a", 0));

    tokio::time::timeout(
        Duration::from_secs(2),
        notifier.shutdown(Duration::from_millis(50)),
    )
    .await
    .expect("shutdown bounded by grace");
    assert!(seen.lock().expect("seen").is_empty());
}

#[test]
fn subscribe_outside_runtime_is_rejected() {
    let notifier = notifier(4, OverflowPolicy::DropOldest);
    assert!(matches!(
        notifier.subscribe(Arc::new(FailingListener)),
        Err(NotifyError::NoRuntime)
    ));
    assert_eq!(notifier.subscriber_count(), 0);
    assert_eq!(notifier.publish(&event("a", 1)), 0);
}
