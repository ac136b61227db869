//! 事件分发器
//!
//! 每个订阅者一条有界队列和一个投递任务。`publish` 在调用方线程内只做入队，
//! 投递任务按队列顺序逐条调用监听器。

use crate::listener::EventListener;
use crate::NotifyError;
use domain::TransitionEvent;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 默认每订阅者队列容量。
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// 队列满时的丢弃策略。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// 丢弃队列中最旧的事件，保留新事件。
    #[default]
    DropOldest,
    /// 丢弃新到达的事件。
    DropNewest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
        }
    }
}

/// 分发器参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierConfig {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl NotifierConfig {
    fn sanitized(mut self) -> Self {
        if self.queue_capacity == 0 {
            self.queue_capacity = 1;
        }
        self
    }
}

/// 订阅句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 单个订阅者的投递统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
    pub queued: usize,
}

struct Subscription {
    listener_name: String,
    queue: Mutex<VecDeque<TransitionEvent>>,
    capacity: usize,
    overflow: OverflowPolicy,
    wake: Notify,
    cancel: CancellationToken,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Subscription {
    /// 入队；返回是否发生丢弃。
    fn enqueue(&self, event: &TransitionEvent) -> bool {
        let dropped = {
            let Ok(mut queue) = self.queue.lock() else {
                return true;
            };
            if queue.len() < self.capacity {
                queue.push_back(event.clone());
                false
            } else {
                match self.overflow {
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(event.clone());
                    }
                    OverflowPolicy::DropNewest => {}
                }
                true
            }
        };
        if dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            dsr_telemetry::record_event_dropped();
        }
        self.wake.notify_one();
        dropped
    }

    fn pop(&self) -> Option<TransitionEvent> {
        self.queue.lock().ok()?.pop_front()
    }

    fn clear(&self) -> usize {
        match self.queue.lock() {
            Ok(mut queue) => {
                let pending = queue.len();
                queue.clear();
                pending
            }
            Err(_) => 0,
        }
    }

    fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queued: self.queue.lock().map(|queue| queue.len()).unwrap_or(0),
        }
    }
}

struct SubscriberSlot {
    subscription: Arc<Subscription>,
    task: JoinHandle<()>,
}

/// 事件分发器。
///
/// 必须在 tokio 运行时内调用 [`EventNotifier::subscribe`]。
pub struct EventNotifier {
    config: NotifierConfig,
    subscribers: RwLock<HashMap<SubscriptionHandle, SubscriberSlot>>,
    closed: AtomicBool,
    draining: CancellationToken,
}

impl EventNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config: config.sanitized(),
            subscribers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            draining: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> NotifierConfig {
        self.config
    }

    /// 注册订阅者并启动其投递任务。
    ///
    /// 投递任务由当前 tokio 运行时驱动；在运行时之外调用返回 [`NotifyError::NoRuntime`]。
    pub fn subscribe(
        &self,
        listener: Arc<dyn EventListener>,
    ) -> Result<SubscriptionHandle, NotifyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NotifyError::Closed);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let handle = SubscriptionHandle::new();
        let subscription = Arc::new(Subscription {
            listener_name: listener.name().to_string(),
            queue: Mutex::new(VecDeque::with_capacity(self.config.queue_capacity.min(1024))),
            capacity: self.config.queue_capacity,
            overflow: self.config.overflow,
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        let task = runtime.spawn(deliver_loop(
            handle,
            subscription.clone(),
            listener,
            self.draining.clone(),
        ));
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|_| NotifyError::Closed)?;
        subscribers.insert(handle, SubscriberSlot { subscription, task });
        info!(
            target: "dsr.notify",
            subscription = %handle,
            capacity = self.config.queue_capacity,
            overflow = self.config.overflow.as_str(),
            "subscriber_added"
        );
        Ok(handle)
    }

    /// 取消订阅。返回后该订阅者不会再收到任何事件，已排队的事件被丢弃。
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let slot = match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.remove(&handle),
            Err(_) => None,
        };
        let Some(slot) = slot else {
            return false;
        };
        slot.subscription.cancel.cancel();
        let discarded = slot.subscription.clear();
        info!(
            target: "dsr.notify",
            subscription = %handle,
            discarded,
            "subscriber_removed"
        );
        true
    }

    /// 向所有订阅者入队；不等待投递。返回成功入队的订阅者数，发布计数按同一口径累加。
    pub fn publish(&self, event: &TransitionEvent) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        let Ok(subscribers) = self.subscribers.read() else {
            return 0;
        };
        let mut accepted = 0;
        for slot in subscribers.values() {
            let dropped = slot.subscription.enqueue(event);
            let kept = !(dropped && slot.subscription.overflow == OverflowPolicy::DropNewest);
            if kept {
                accepted += 1;
                dsr_telemetry::record_event_published();
            }
        }
        accepted
    }

    pub fn stats(&self, handle: SubscriptionHandle) -> Option<SubscriptionStats> {
        let subscribers = self.subscribers.read().ok()?;
        subscribers
            .get(&handle)
            .map(|slot| slot.subscription.stats())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 停止接收新事件，等待各订阅者处理完已排队事件。
    ///
    /// 超过 `grace` 仍未完成的投递任务会被强制取消。
    pub async fn shutdown(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.draining.cancel();
        let slots: Vec<(SubscriptionHandle, SubscriberSlot)> = match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.drain().collect(),
            Err(_) => Vec::new(),
        };
        let deadline = tokio::time::Instant::now() + grace;
        for (handle, slot) in slots {
            let SubscriberSlot { subscription, mut task } = slot;
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(_) => {}
                Err(_) => {
                    subscription.cancel.cancel();
                    let discarded = subscription.clear();
                    warn!(
                        target: "dsr.notify",
                        subscription = %handle,
                        discarded,
                        "subscriber_drain_timeout"
                    );
                    let _ = task.await;
                }
            }
        }
        info!(target: "dsr.notify", "notifier_stopped");
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

async fn deliver_loop(
    handle: SubscriptionHandle,
    subscription: Arc<Subscription>,
    listener: Arc<dyn EventListener>,
    draining: CancellationToken,
) {
    loop {
        if subscription.cancel.is_cancelled() {
            break;
        }
        let Some(event) = subscription.pop() else {
            if draining.is_cancelled() {
                break;
            }
            tokio::select! {
                biased;
                _ = subscription.cancel.cancelled() => break,
                _ = subscription.wake.notified() => {}
                _ = draining.cancelled() => {}
            }
            continue;
        };
        tokio::select! {
            biased;
            _ = subscription.cancel.cancelled() => break,
            result = listener.on_event(&event) => match result {
                Ok(()) => {
                    subscription.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    subscription.failed.fetch_add(1, Ordering::Relaxed);
                    dsr_telemetry::record_delivery_failure();
                    warn!(
                        target: "dsr.notify",
                        subscription = %handle,
                        listener = %subscription.listener_name,
                        device_id = %event.device_id,
                        error = %err,
                        "delivery_failed"
                    );
                }
            },
        }
    }
    debug!(target: "dsr.notify", subscription = %handle, "delivery_stopped");
}
