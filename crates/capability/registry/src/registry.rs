//! 注册表门面
//!
//! 上报与扫描产生的变迁在对应设备的记录锁内完成：写历史、计数、发布事件。
//! 发布只做入队，因此持锁时间不受订阅者快慢影响，同一设备的事件保持产生顺序。

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::view::DeviceStatusView;
use domain::{
    DeviceId, DeviceRecord, DeviceState, StatusPayload, Thresholds, Timestamp, TransitionEvent,
};
use dsr_clock::{Clock, MonotonicClock};
use dsr_notify::{EventListener, EventNotifier, SubscriptionHandle, SubscriptionStats};
use dsr_staleness::{
    StalenessEngine, StalenessStrategy, SweepReport, ThresholdPolicy, effective_state,
    spawn_sweep_loop,
};
use dsr_storage::{DeviceRecordStore, HistoryEntry, HistoryStore, normalize_device_id};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 上报回执。
#[derive(Debug, Clone)]
pub struct Ack {
    pub device_id: DeviceId,
    /// 上报后的存储状态。
    pub state: DeviceState,
    pub last_seen_at: Timestamp,
    /// 乱序上报为 false。
    pub applied: bool,
    pub transition: Option<TransitionEvent>,
}

struct RegistryInner {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    store: Arc<DeviceRecordStore>,
    policy: Arc<ThresholdPolicy>,
    engine: StalenessEngine,
    history: HistoryStore,
    notifier: EventNotifier,
    sweepers: Mutex<Vec<CancellationToken>>,
}

impl RegistryInner {
    /// 在记录锁内调用。
    fn on_transition(&self, event: &TransitionEvent, record: &DeviceRecord) {
        if let Err(err) = self.history.append(HistoryEntry::from_transition(event, record)) {
            warn!(
                target: "dsr.registry",
                device_id = %event.device_id,
                error = %err,
                "history_append_failed"
            );
        }
        if event.is_new_device() {
            dsr_telemetry::record_device_registered();
        }
        match event.to {
            DeviceState::Online => dsr_telemetry::record_transition_online(),
            DeviceState::Stale => dsr_telemetry::record_transition_stale(),
            DeviceState::Offline => dsr_telemetry::record_transition_offline(),
        }
        // info 级的变迁日志由订阅的 LogListener 输出
        debug!(
            target: "dsr.registry",
            device_id = %event.device_id,
            to = %event.to,
            kind = event.kind(),
            "transition_recorded"
        );
        self.notifier.publish(event);
    }

    fn present(&self, mut record: DeviceRecord, now: Timestamp) -> DeviceRecord {
        if self.config.strategy == StalenessStrategy::Lazy {
            let thresholds = self.policy.for_device(&record.id);
            record.state = effective_state(&record, now, &thresholds);
        }
        record
    }
}

/// 设备状态注册表。克隆开销很小，各克隆共享同一份状态。
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    /// 校验参数并构建注册表；参数非法时拒绝构建。
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Result<Self, RegistryError> {
        config.validate()?;
        let store = Arc::new(DeviceRecordStore::with_shards(config.store_shards));
        let policy = Arc::new(
            ThresholdPolicy::new(config.thresholds)
                .map_err(|err| RegistryError::InvalidConfiguration(err.to_string()))?,
        );
        let engine = StalenessEngine::new(store.clone(), policy.clone());
        let history = HistoryStore::new(config.history_limit);
        let notifier = EventNotifier::new(config.notifier);
        info!(
            target: "dsr.registry",
            stale_after_ms = config.thresholds.stale_after.as_millis() as u64,
            offline_after_ms = config.thresholds.offline_after.as_millis() as u64,
            strategy = ?config.strategy,
            shards = config.store_shards,
            "registry_created"
        );
        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                clock,
                store,
                policy,
                engine,
                history,
                notifier,
                sweepers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// 使用进程单调时钟构建。
    pub fn with_monotonic_clock(config: RegistryConfig) -> Result<Self, RegistryError> {
        Self::new(config, Arc::new(MonotonicClock::new()))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// 接收一次设备上报。`observed_at` 缺省为当前时钟时间。
    ///
    /// 乱序上报不是错误：返回 `applied = false`，状态与 `last_seen_at` 不变。
    pub fn report(
        &self,
        device_id: &str,
        payload: StatusPayload,
        observed_at: Option<Timestamp>,
    ) -> Result<Ack, RegistryError> {
        let id = parse_id(device_id)?;
        let observed_at = observed_at.unwrap_or_else(|| self.inner.clock.now());
        let inner = &*self.inner;
        let outcome = inner.store.upsert(
            &id,
            payload,
            observed_at,
            inner.config.late_report_policy,
            |event, record| inner.on_transition(event, record),
        )?;
        if outcome.applied {
            dsr_telemetry::record_report_accepted();
        } else {
            dsr_telemetry::record_report_late();
        }
        debug!(
            target: "dsr.registry",
            device_id = %id,
            observed_at_ms = observed_at.as_millis(),
            applied = outcome.applied,
            state = %outcome.record.state,
            "device_reported"
        );
        Ok(Ack {
            device_id: id,
            state: outcome.record.state,
            last_seen_at: outcome.record.last_seen_at,
            applied: outcome.applied,
            transition: outcome.transition,
        })
    }

    /// 查询单台设备。惰性策略下返回按当前时间推导的状态。
    pub fn query(&self, device_id: &str) -> Result<DeviceRecord, RegistryError> {
        let id = parse_id(device_id)?;
        let record = self
            .inner
            .store
            .get(&id)?
            .ok_or(RegistryError::NotFound(id))?;
        Ok(self.inner.present(record, self.inner.clock.now()))
    }

    /// 列出设备（按 ID 排序），可按状态过滤。
    ///
    /// 设备集合在调用时确定；每条记录独立原子复制。
    pub fn list(
        &self,
        filter: Option<DeviceState>,
    ) -> Result<impl Iterator<Item = DeviceRecord> + use<>, RegistryError> {
        let snapshot = self.inner.store.list()?;
        let now = self.inner.clock.now();
        let inner = self.inner.clone();
        Ok(snapshot
            .into_iter()
            .map(move |record| inner.present(record, now))
            .filter(move |record| filter.is_none_or(|state| record.state == state)))
    }

    pub fn device_count(&self) -> Result<usize, RegistryError> {
        Ok(self.inner.store.len()?)
    }

    /// 单台设备的状态视图（含剩余时间）。
    pub fn status(&self, device_id: &str) -> Result<DeviceStatusView, RegistryError> {
        let id = parse_id(device_id)?;
        let record = self
            .inner
            .store
            .get(&id)?
            .ok_or(RegistryError::NotFound(id))?;
        let thresholds = self.inner.policy.for_device(&record.id);
        Ok(DeviceStatusView::new(record, self.inner.clock.now(), thresholds))
    }

    /// 全部设备的状态视图。
    pub fn status_board(&self) -> Result<Vec<DeviceStatusView>, RegistryError> {
        let now = self.inner.clock.now();
        let snapshot = self.inner.store.list()?;
        Ok(snapshot
            .into_iter()
            .map(|record| {
                let thresholds = self.inner.policy.for_device(&record.id);
                DeviceStatusView::new(record, now, thresholds)
            })
            .collect())
    }

    /// 设备状态变迁历史（时间先后）。
    pub fn history(&self, device_id: &str) -> Result<Vec<HistoryEntry>, RegistryError> {
        let id = parse_id(device_id)?;
        if self.inner.store.get(&id)?.is_none() {
            return Err(RegistryError::NotFound(id));
        }
        Ok(self.inner.history.list(&id)?)
    }

    /// 为单台设备设置阈值，可早于其首次上报。
    pub fn configure_device(
        &self,
        device_id: &str,
        thresholds: Thresholds,
    ) -> Result<(), RegistryError> {
        let id = parse_id(device_id)?;
        self.inner
            .policy
            .set_override(id.clone(), thresholds)
            .map_err(|err| RegistryError::InvalidConfiguration(err.to_string()))?;
        info!(
            target: "dsr.registry",
            device_id = %id,
            stale_after_ms = thresholds.stale_after.as_millis() as u64,
            offline_after_ms = thresholds.offline_after.as_millis() as u64,
            "device_thresholds_configured"
        );
        Ok(())
    }

    /// 恢复为全局阈值；返回此前是否存在覆盖。
    pub fn clear_device_thresholds(&self, device_id: &str) -> Result<bool, RegistryError> {
        let id = parse_id(device_id)?;
        Ok(self.inner.policy.clear_override(&id))
    }

    pub fn thresholds_for(&self, device_id: &str) -> Result<Thresholds, RegistryError> {
        let id = parse_id(device_id)?;
        Ok(self.inner.policy.for_device(&id))
    }

    /// 删除设备记录、历史与阈值覆盖，不产生事件。
    ///
    /// 历史在记录锁内清除，与同一设备的并发上报不会交错出残留历史。
    pub fn purge(&self, device_id: &str) -> Result<DeviceRecord, RegistryError> {
        let id = parse_id(device_id)?;
        let mut history_cleared = Ok(());
        let record = self
            .inner
            .store
            .remove(&id, |_| history_cleared = self.inner.history.remove(&id))?
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        history_cleared?;
        self.inner.policy.clear_override(&id);
        info!(target: "dsr.registry", device_id = %id, state = %record.state, "device_purged");
        Ok(record)
    }

    /// 启动时装载已知记录，不产生事件；已存在的设备跳过。返回装载条数。
    ///
    /// 晚于当前时钟的时间戳按当前时间装载，否则之后的上报都会被当作乱序丢弃。
    pub fn restore(
        &self,
        records: impl IntoIterator<Item = DeviceRecord>,
    ) -> Result<usize, RegistryError> {
        let now = self.inner.clock.now();
        let mut restored = 0;
        for record in records {
            let id = parse_id(record.id.as_str())?;
            if record.last_seen_at > now
                || record.state_changed_at > now
                || record.created_at > now
            {
                warn!(
                    target: "dsr.registry",
                    device_id = %id,
                    last_seen_at_ms = record.last_seen_at.as_millis(),
                    now_ms = now.as_millis(),
                    "restored_timestamp_clamped"
                );
            }
            let record = DeviceRecord {
                id,
                last_seen_at: record.last_seen_at.min(now),
                created_at: record.created_at.min(now),
                state_changed_at: record.state_changed_at.min(now),
                ..record
            };
            if self.inner.store.restore(record)? {
                restored += 1;
            }
        }
        info!(target: "dsr.registry", restored, "devices_restored");
        Ok(restored)
    }

    /// 注册订阅者。须在 tokio 运行时内调用，否则返回 [`RegistryError::NoRuntime`]。
    pub fn subscribe(
        &self,
        listener: Arc<dyn EventListener>,
    ) -> Result<SubscriptionHandle, RegistryError> {
        Ok(self.inner.notifier.subscribe(listener)?)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.subscriber_count()
    }

    /// 返回后该订阅者不会再收到任何事件。
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.notifier.unsubscribe(handle)
    }

    pub fn subscription_stats(&self, handle: SubscriptionHandle) -> Option<SubscriptionStats> {
        self.inner.notifier.stats(handle)
    }

    /// 以当前时钟执行一次扫描。惰性策略下也可显式调用。
    pub fn sweep_once(&self) -> Result<SweepReport, RegistryError> {
        let now = self.inner.clock.now();
        let inner = &*self.inner;
        Ok(inner
            .engine
            .sweep_once(now, |event, record| inner.on_transition(event, record))?)
    }

    /// 启动周期扫描；惰性策略下或不在 tokio 运行时内时不启动，返回 `None`。
    ///
    /// `cancel` 或 [`DeviceRegistry::shutdown`] 任一触发都会停止扫描。
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.inner.config.strategy == StalenessStrategy::Lazy {
            debug!(target: "dsr.registry", "sweeper_skipped_lazy");
            return None;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(target: "dsr.registry", "sweeper_skipped_no_runtime");
            return None;
        }
        if self.inner.notifier.is_closed() {
            return None;
        }
        match self.inner.sweepers.lock() {
            Ok(mut sweepers) => sweepers.push(cancel.clone()),
            Err(_) => {
                warn!(target: "dsr.registry", "sweeper_registry_lock_failed");
                return None;
            }
        }
        let registry = self.clone();
        Some(spawn_sweep_loop(
            self.inner.config.sweep_period,
            cancel,
            move || registry.sweep_once(),
        ))
    }

    /// 停止扫描，拒绝新事件，等待订阅者排空队列。
    pub async fn shutdown(&self) {
        let sweepers = match self.inner.sweepers.lock() {
            Ok(mut sweepers) => std::mem::take(&mut *sweepers),
            Err(_) => Vec::new(),
        };
        for token in sweepers {
            token.cancel();
        }
        self.inner
            .notifier
            .shutdown(self.inner.config.shutdown_grace)
            .await;
        info!(target: "dsr.registry", "registry_stopped");
    }
}

fn parse_id(raw: &str) -> Result<DeviceId, RegistryError> {
    normalize_device_id(raw).map_err(|err| RegistryError::InvalidDeviceId(err.to_string()))
}
