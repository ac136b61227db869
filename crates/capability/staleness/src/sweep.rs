//! 主动扫描
//!
//! 逐个设备检查并应用 Online→Stale、Stale→Offline；每次只持有一把记录锁，
//! 过期判定在锁内重新计算，扫描期间到达的新上报不会被误判。

use crate::evaluate::{is_past_offline, is_past_stale};
use crate::policy::ThresholdPolicy;
use domain::{DeviceRecord, Timestamp, TransitionEvent};
use dsr_storage::{DeviceRecordStore, StorageError};
use dsr_telemetry::record_sweep;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 单次扫描结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub marked_stale: usize,
    pub marked_offline: usize,
}

impl SweepReport {
    pub fn transitions(&self) -> usize {
        self.marked_stale + self.marked_offline
    }
}

pub struct StalenessEngine {
    store: Arc<DeviceRecordStore>,
    policy: Arc<ThresholdPolicy>,
}

impl StalenessEngine {
    pub fn new(store: Arc<DeviceRecordStore>, policy: Arc<ThresholdPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// 以 `now` 为基准扫描全部设备。
    ///
    /// 同一次扫描内两个阈值都已超过时，先转 Stale 再转 Offline，产生两次变迁。
    /// `on_transition` 在对应设备的记录锁内调用。
    pub fn sweep_once(
        &self,
        now: Timestamp,
        on_transition: impl Fn(&TransitionEvent, &DeviceRecord),
    ) -> Result<SweepReport, StorageError> {
        let started = Instant::now();
        let mut report = SweepReport::default();
        for id in self.store.ids()? {
            report.examined += 1;
            let thresholds = self.policy.for_device(&id);
            if self.store.mark_stale_if(
                &id,
                now,
                |record| is_past_stale(record, now, &thresholds),
                |event, record| on_transition(event, record),
            )? {
                report.marked_stale += 1;
            }
            if self.store.mark_offline_if(
                &id,
                now,
                |record| is_past_offline(record, now, &thresholds),
                |event, record| on_transition(event, record),
            )? {
                report.marked_offline += 1;
            }
        }
        record_sweep(u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX));
        if report.transitions() > 0 {
            info!(
                target: "dsr.staleness",
                examined = report.examined,
                marked_stale = report.marked_stale,
                marked_offline = report.marked_offline,
                now_ms = now.as_millis(),
                "sweep_completed"
            );
        } else {
            debug!(
                target: "dsr.staleness",
                examined = report.examined,
                now_ms = now.as_millis(),
                "sweep_completed"
            );
        }
        Ok(report)
    }
}

/// 启动周期扫描任务。
///
/// 取消后不再开始新一轮扫描；正在执行的一轮是同步的，会完整结束。
pub fn spawn_sweep_loop<F, E>(
    period: Duration,
    cancel: CancellationToken,
    mut sweep: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Result<SweepReport, E> + Send + 'static,
    E: std::fmt::Display,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(target: "dsr.staleness", period_ms = period.as_millis() as u64, "sweeper_started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = sweep() {
                        warn!(target: "dsr.staleness", error = %err, "sweep_failed");
                    }
                }
            }
        }
        info!(target: "dsr.staleness", "sweeper_stopped");
    })
}
