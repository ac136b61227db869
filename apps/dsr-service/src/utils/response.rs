//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_error, not_found_error, registry_error
//! - DTO 转换：ack_to_dto, record_to_dto, history_to_dto, status_to_dto

use api_contract::{
    AckDto, ApiResponse, DeviceRecordDto, HistoryEntryDto, StatusBoardEntryDto, ThresholdsDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DeviceRecord, Thresholds};
use dsr_registry::{Ack, DeviceStatusView, HistoryEntry, RegistryError};

pub fn ok<T: serde::Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 设备不存在
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("DEVICE.NOT_FOUND", "device not found")),
    )
        .into_response()
}

/// 注册表错误 → HTTP 状态码与错误码
pub fn registry_error(err: RegistryError) -> Response {
    match err {
        RegistryError::NotFound(_) => not_found_error(),
        RegistryError::InvalidDeviceId(message) | RegistryError::InvalidConfiguration(message) => {
            bad_request_error(message)
        }
        RegistryError::ShutDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error("SERVICE.UNAVAILABLE", "shutting down")),
        )
            .into_response(),
        RegistryError::Storage(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
        )
            .into_response(),
        RegistryError::NoRuntime => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", "no runtime")),
        )
            .into_response(),
    }
}

pub fn ack_to_dto(ack: Ack) -> AckDto {
    AckDto {
        device_id: ack.device_id.into_inner(),
        state: ack.state.as_str().to_string(),
        last_seen_at_ms: ack.last_seen_at.as_millis(),
        applied: ack.applied,
        transition: ack.transition.map(|event| event.kind().to_string()),
    }
}

pub fn record_to_dto(record: DeviceRecord) -> DeviceRecordDto {
    DeviceRecordDto {
        device_id: record.id.into_inner(),
        state: record.state.as_str().to_string(),
        last_seen_at_ms: record.last_seen_at.as_millis(),
        created_at_ms: record.created_at.as_millis(),
        state_changed_at_ms: record.state_changed_at.as_millis(),
        last_payload: record.last_payload,
    }
}

pub fn history_to_dto(entry: HistoryEntry) -> HistoryEntryDto {
    HistoryEntryDto {
        at_ms: entry.at.as_millis(),
        from: entry.from.map(|state| state.as_str().to_string()),
        to: entry.to.as_str().to_string(),
        last_seen_at_ms: entry.last_seen_at.as_millis(),
        message: entry.message,
    }
}

pub fn status_to_dto(view: DeviceStatusView) -> StatusBoardEntryDto {
    StatusBoardEntryDto {
        stale_in: view.stale_in(),
        offline_in: view.offline_in(),
        stale_in_ms: duration_ms(view.time_until_stale),
        offline_in_ms: duration_ms(view.time_until_offline),
        effective_state: view.effective_state.as_str().to_string(),
        device_id: view.record.id.into_inner(),
        state: view.record.state.as_str().to_string(),
        last_seen_at_ms: view.record.last_seen_at.as_millis(),
    }
}

pub fn thresholds_to_dto(thresholds: Thresholds) -> ThresholdsDto {
    ThresholdsDto {
        stale_after_ms: duration_ms(thresholds.stale_after),
        offline_after_ms: duration_ms(thresholds.offline_after),
    }
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
