//! 惰性求值与剩余时间
//!
//! 读取路径按当前时间推导设备的有效状态，不修改存储、不发事件。

use domain::{DeviceRecord, DeviceState, Thresholds, Timestamp};
use std::time::Duration;

/// 距离阈值到期的剩余时间（已到期为 0）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub until_stale: Duration,
    pub until_offline: Duration,
}

/// 静默时长严格超过阈值才算过期。
pub fn is_past_stale(record: &DeviceRecord, now: Timestamp, thresholds: &Thresholds) -> bool {
    record.silent_for(now) > thresholds.stale_after
}

pub fn is_past_offline(record: &DeviceRecord, now: Timestamp, thresholds: &Thresholds) -> bool {
    record.silent_for(now) > thresholds.offline_after
}

/// 有效状态：存储状态与时间阈值推导结果中“更靠后”的一个。
pub fn effective_state(
    record: &DeviceRecord,
    now: Timestamp,
    thresholds: &Thresholds,
) -> DeviceState {
    match record.state {
        DeviceState::Offline => DeviceState::Offline,
        DeviceState::Stale | DeviceState::Online if is_past_offline(record, now, thresholds) => {
            DeviceState::Offline
        }
        DeviceState::Online if is_past_stale(record, now, thresholds) => DeviceState::Stale,
        state => state,
    }
}

pub fn deadlines(record: &DeviceRecord, now: Timestamp, thresholds: &Thresholds) -> Deadlines {
    let silent = record.silent_for(now);
    Deadlines {
        until_stale: thresholds.stale_after.saturating_sub(silent),
        until_offline: thresholds.offline_after.saturating_sub(silent),
    }
}

/// 人类可读的剩余时间：`1h 2m 3s`、`4m 5s`、`6s`，到期为 `expired`。
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    if total == 0 {
        return "expired".to_string();
    }
    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceId;

    fn thresholds() -> Thresholds {
        Thresholds {
            stale_after: Duration::from_secs(5),
            offline_after: Duration::from_secs(15),
        }
    }

    fn online_at(secs: u64) -> DeviceRecord {
        DeviceRecord::new_online(DeviceId::from("device-1"), None, Timestamp::from_secs(secs))
    }

    #[test]
    fn effective_state_follows_silence() {
        let record = online_at(0);
        let t = thresholds();
        assert_eq!(effective_state(&record, Timestamp::from_secs(5), &t), DeviceState::Online);
        assert_eq!(effective_state(&record, Timestamp::from_secs(6), &t), DeviceState::Stale);
        assert_eq!(effective_state(&record, Timestamp::from_secs(16), &t), DeviceState::Offline);
    }

    #[test]
    fn stored_offline_stays_offline() {
        let mut record = online_at(100);
        record.state = DeviceState::Offline;
        assert_eq!(
            effective_state(&record, Timestamp::from_secs(100), &thresholds()),
            DeviceState::Offline
        );
    }

    #[test]
    fn deadlines_saturate_at_zero() {
        let record = online_at(0);
        let d = deadlines(&record, Timestamp::from_secs(7), &thresholds());
        assert_eq!(d.until_stale, Duration::ZERO);
        assert_eq!(d.until_offline, Duration::from_secs(8));
    }

    #[test]
    fn format_remaining_matches_units() {
        assert_eq!(format_remaining(Duration::ZERO), "expired");
        assert_eq!(format_remaining(Duration::from_millis(900)), "expired");
        assert_eq!(format_remaining(Duration::from_secs(6)), "6s");
        assert_eq!(format_remaining(Duration::from_secs(245)), "4m 5s");
        assert_eq!(format_remaining(Duration::from_secs(3723)), "1h 2m 3s");
    }
}
