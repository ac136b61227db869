use crate::{DeviceId, Timestamp};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 设备上报的健康数据（电量、固件版本等），核心只存储和转发，不做解释。
pub type StatusPayload = serde_json::Map<String, serde_json::Value>;

/// 设备在线状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Online,
    Stale,
    Offline,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Online => "online",
            DeviceState::Stale => "stale",
            DeviceState::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(DeviceState::Online),
            "stale" => Ok(DeviceState::Stale),
            "offline" => Ok(DeviceState::Offline),
            other => Err(format!("unknown device state: {other}")),
        }
    }
}

/// 单设备的最新状态快照。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub last_payload: Option<StatusPayload>,
    pub last_seen_at: Timestamp,
    pub state: DeviceState,
    pub created_at: Timestamp,
    pub state_changed_at: Timestamp,
}

impl DeviceRecord {
    /// 首次上报创建的记录（Online）。
    pub fn new_online(
        id: DeviceId,
        payload: Option<StatusPayload>,
        observed_at: Timestamp,
    ) -> Self {
        Self {
            id,
            last_payload: payload,
            last_seen_at: observed_at,
            state: DeviceState::Online,
            created_at: observed_at,
            state_changed_at: observed_at,
        }
    }

    /// 自最后一次上报以来的静默时长。
    pub fn silent_for(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.last_seen_at)
    }
}

/// 状态变迁事件。
///
/// `from` 为 `None` 表示新设备首次上线。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub device_id: DeviceId,
    pub from: Option<DeviceState>,
    pub to: DeviceState,
    pub at: Timestamp,
}

impl TransitionEvent {
    pub fn is_new_device(&self) -> bool {
        self.from.is_none()
    }

    /// 从 Stale/Offline 恢复为 Online。
    pub fn is_recovery(&self) -> bool {
        matches!(
            (self.from, self.to),
            (Some(DeviceState::Stale | DeviceState::Offline), DeviceState::Online)
        )
    }

    /// 事件名（日志与历史记录使用）。
    pub fn kind(&self) -> &'static str {
        match (self.from, self.to) {
            (None, _) => "registered",
            (Some(DeviceState::Offline), DeviceState::Online) => "recovered",
            (Some(_), DeviceState::Online) => "online",
            (Some(_), DeviceState::Stale) => "stale",
            (Some(_), DeviceState::Offline) => "offline",
        }
    }
}

/// 阈值校验错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidThresholds {
    #[error("stale threshold must be greater than zero")]
    ZeroStale,
    #[error("offline threshold ({offline_ms}ms) must be greater than stale threshold ({stale_ms}ms)")]
    OfflineNotAfterStale { stale_ms: u128, offline_ms: u128 },
}

/// 过期判定阈值：静默超过 `stale_after` 视为 Stale，超过 `offline_after` 视为 Offline。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub stale_after: Duration,
    pub offline_after: Duration,
}

impl Thresholds {
    pub fn new(stale_after: Duration, offline_after: Duration) -> Result<Self, InvalidThresholds> {
        let thresholds = Self {
            stale_after,
            offline_after,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// 要求 `offline_after > stale_after > 0`。
    pub fn validate(&self) -> Result<(), InvalidThresholds> {
        if self.stale_after.is_zero() {
            return Err(InvalidThresholds::ZeroStale);
        }
        if self.offline_after <= self.stale_after {
            return Err(InvalidThresholds::OfflineNotAfterStale {
                stale_ms: self.stale_after.as_millis(),
                offline_ms: self.offline_after.as_millis(),
            });
        }
        Ok(())
    }
}
