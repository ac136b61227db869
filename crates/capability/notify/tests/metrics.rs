//! 计数器是进程级全局量，此文件只放一个用例以便断言精确增量。

use domain::{DeviceId, DeviceState, Timestamp, TransitionEvent};
use dsr_notify::{ChannelListener, EventNotifier, NotifierConfig};
use std::sync::Arc;

#[tokio::test]
async fn published_counter_counts_each_subscriber_enqueue() {
    let notifier = EventNotifier::new(NotifierConfig::default());
    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (listener, rx) = ChannelListener::channel(8);
        notifier.subscribe(Arc::new(listener)).expect("subscribe");
        receivers.push(rx);
    }
    let event = TransitionEvent {
        device_id: DeviceId::from("device-1"),
        from: None,
        to: DeviceState::Online,
        at: Timestamp::from_millis(1),
    };

    let before = dsr_telemetry::metrics().snapshot().events_published;
    assert_eq!(notifier.publish(&event), 3);
    assert_eq!(notifier.publish(&event), 3);
    let after = dsr_telemetry::metrics().snapshot().events_published;
    assert_eq!(after - before, 6);

    for rx in &mut receivers {
        assert_eq!(rx.recv().await.expect("event").device_id, event.device_id);
    }
}
