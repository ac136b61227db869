//! 稳定的 DTO 与 API 响应契约。
//!
//! 时间字段均为注册表时钟上的毫秒数，剩余时间同时给出毫秒与可读文本。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 设备上报请求体：`payload` 为任意 JSON 对象。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// 上报回执。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckDto {
    pub device_id: String,
    pub state: String,
    pub last_seen_at_ms: u64,
    pub applied: bool,
    /// 本次上报触发的变迁类型（registered / recovered / online）。
    pub transition: Option<String>,
}

/// 设备记录。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecordDto {
    pub device_id: String,
    pub state: String,
    pub last_seen_at_ms: u64,
    pub created_at_ms: u64,
    pub state_changed_at_ms: u64,
    pub last_payload: Option<Map<String, Value>>,
}

/// 状态历史条目。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryDto {
    pub at_ms: u64,
    pub from: Option<String>,
    pub to: String,
    pub last_seen_at_ms: u64,
    pub message: String,
}

/// 设备阈值设置请求体（秒）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsRequest {
    #[serde(alias = "stale_after_seconds")]
    pub stale_after_seconds: u64,
    #[serde(alias = "offline_after_seconds")]
    pub offline_after_seconds: u64,
}

/// 生效阈值。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsDto {
    pub stale_after_ms: u64,
    pub offline_after_ms: u64,
}

/// 状态看板条目。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBoardEntryDto {
    pub device_id: String,
    pub state: String,
    pub effective_state: String,
    pub last_seen_at_ms: u64,
    pub stale_in_ms: u64,
    pub stale_in: String,
    pub offline_in_ms: u64,
    pub offline_in: String,
}

/// 运行指标快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub reports_accepted: u64,
    pub reports_late: u64,
    pub devices_registered: u64,
    pub transitions_online: u64,
    pub transitions_stale: u64,
    pub transitions_offline: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub delivery_failures: u64,
    pub sweeps: u64,
    pub sweep_duration_us_total: u64,
}
