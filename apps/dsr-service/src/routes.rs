//! 路由定义
//!
//! - 健康检查：/health
//! - 设备上报与查询：/api/devices/*
//! - 状态看板：/api/status-board
//! - 运行指标：/metrics

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/api/devices", get(list_devices))
        .route(
            "/api/devices/:device_id",
            get(get_device).delete(purge_device),
        )
        .route("/api/devices/:device_id/reports", post(report_device))
        .route("/api/devices/:device_id/history", get(get_device_history))
        .route(
            "/api/devices/:device_id/thresholds",
            get(get_device_thresholds)
                .put(put_device_thresholds)
                .delete(clear_device_thresholds),
        )
        .route("/api/status-board", get(get_status_board))
}
