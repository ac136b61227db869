//! 健康检查、状态看板与运行指标。
//!
//! - GET /health
//! - GET /api/status-board
//! - GET /metrics

use crate::AppState;
use crate::utils::response::{ok, registry_error, status_to_dto};
use api_contract::{MetricsSnapshotDto, StatusBoardEntryDto};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use dsr_telemetry::metrics;

pub async fn health(State(state): State<AppState>) -> Response {
    let devices = state.registry.device_count().unwrap_or(0);
    Json(serde_json::json!({ "ok": true, "devices": devices })).into_response()
}

/// 全部设备的有效状态与距离各阈值的剩余时间。
pub async fn get_status_board(State(state): State<AppState>) -> Response {
    match state.registry.status_board() {
        Ok(views) => {
            let data: Vec<StatusBoardEntryDto> = views.into_iter().map(status_to_dto).collect();
            ok(data)
        }
        Err(err) => registry_error(err),
    }
}

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    ok(MetricsSnapshotDto {
        reports_accepted: snapshot.reports_accepted,
        reports_late: snapshot.reports_late,
        devices_registered: snapshot.devices_registered,
        transitions_online: snapshot.transitions_online,
        transitions_stale: snapshot.transitions_stale,
        transitions_offline: snapshot.transitions_offline,
        events_published: snapshot.events_published,
        events_dropped: snapshot.events_dropped,
        delivery_failures: snapshot.delivery_failures,
        sweeps: snapshot.sweeps,
        sweep_duration_us_total: snapshot.sweep_duration_us_total,
    })
}
