//! 状态视图：有效状态与距离各阈值的剩余时间。

use domain::{DeviceRecord, DeviceState, Thresholds, Timestamp};
use dsr_staleness::{deadlines, effective_state, format_remaining};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DeviceStatusView {
    pub record: DeviceRecord,
    /// 按当前时间推导的状态（可能领先于存储状态）。
    pub effective_state: DeviceState,
    pub thresholds: Thresholds,
    pub time_until_stale: Duration,
    pub time_until_offline: Duration,
}

impl DeviceStatusView {
    pub fn new(record: DeviceRecord, now: Timestamp, thresholds: Thresholds) -> Self {
        let remaining = deadlines(&record, now, &thresholds);
        Self {
            effective_state: effective_state(&record, now, &thresholds),
            record,
            thresholds,
            time_until_stale: remaining.until_stale,
            time_until_offline: remaining.until_offline,
        }
    }

    pub fn stale_in(&self) -> String {
        format_remaining(self.time_until_stale)
    }

    pub fn offline_in(&self) -> String {
        format_remaining(self.time_until_offline)
    }
}
