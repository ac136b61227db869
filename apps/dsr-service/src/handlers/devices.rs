//! 设备 handlers
//!
//! - POST /api/devices/{id}/reports - 设备上报（时间取服务端时钟）
//! - GET /api/devices?state= - 列出设备，可按状态过滤
//! - GET /api/devices/{id} - 设备详情
//! - DELETE /api/devices/{id} - 清除设备记录与历史
//! - GET /api/devices/{id}/history - 状态变迁历史
//! - GET|PUT|DELETE /api/devices/{id}/thresholds - 设备阈值

use crate::AppState;
use crate::utils::response::{
    ack_to_dto, history_to_dto, ok, record_to_dto, registry_error, thresholds_to_dto,
};
use crate::utils::{parse_state_filter, parse_thresholds};
use api_contract::{DeviceRecordDto, ReportRequest, ThresholdsRequest};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

#[derive(serde::Deserialize, Default)]
pub struct ListQuery {
    state: Option<String>,
}

/// 设备上报
///
/// 上报时间统一取注册表时钟；乱序判定只作用于进程内调用方显式给出的时间。
pub async fn report_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(req): Json<ReportRequest>,
) -> Response {
    match state.registry.report(&path.device_id, req.payload, None) {
        Ok(ack) => ok(ack_to_dto(ack)),
        Err(err) => registry_error(err),
    }
}

pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = match parse_state_filter(query.state.as_deref()) {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    match state.registry.list(filter) {
        Ok(records) => {
            let data: Vec<DeviceRecordDto> = records.map(record_to_dto).collect();
            ok(data)
        }
        Err(err) => registry_error(err),
    }
}

pub async fn get_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    match state.registry.query(&path.device_id) {
        Ok(record) => ok(record_to_dto(record)),
        Err(err) => registry_error(err),
    }
}

/// 清除设备（不产生事件）
pub async fn purge_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    match state.registry.purge(&path.device_id) {
        Ok(record) => ok(record_to_dto(record)),
        Err(err) => registry_error(err),
    }
}

pub async fn get_device_history(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    match state.registry.history(&path.device_id) {
        Ok(entries) => ok(entries.into_iter().map(history_to_dto).collect::<Vec<_>>()),
        Err(err) => registry_error(err),
    }
}

pub async fn get_device_thresholds(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    match state.registry.thresholds_for(&path.device_id) {
        Ok(thresholds) => ok(thresholds_to_dto(thresholds)),
        Err(err) => registry_error(err),
    }
}

/// 设置设备阈值（可早于设备首次上报）
pub async fn put_device_thresholds(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(req): Json<ThresholdsRequest>,
) -> Response {
    let thresholds = match parse_thresholds(&req) {
        Ok(thresholds) => thresholds,
        Err(response) => return response,
    };
    match state.registry.configure_device(&path.device_id, thresholds) {
        Ok(()) => ok(thresholds_to_dto(thresholds)),
        Err(err) => registry_error(err),
    }
}

/// 恢复全局阈值，返回恢复后的生效阈值
pub async fn clear_device_thresholds(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    let result = state
        .registry
        .clear_device_thresholds(&path.device_id)
        .and_then(|_| state.registry.thresholds_for(&path.device_id));
    match result {
        Ok(thresholds) => ok(thresholds_to_dto(thresholds)),
        Err(err) => registry_error(err),
    }
}
