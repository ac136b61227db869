//! 输入校验
//!
//! 失败时直接返回 bad_request_error 响应。

use crate::utils::response::bad_request_error;
use api_contract::ThresholdsRequest;
use axum::response::Response;
use domain::{DeviceState, Thresholds};
use std::time::Duration;

/// 解析可选的状态过滤参数（大小写不敏感，空串视为未提供）。
pub fn parse_state_filter(value: Option<&str>) -> Result<Option<DeviceState>, Response> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(bad_request_error),
    }
}

/// 秒级阈值请求 → 已校验的阈值。
pub fn parse_thresholds(req: &ThresholdsRequest) -> Result<Thresholds, Response> {
    Thresholds::new(
        Duration::from_secs(req.stale_after_seconds),
        Duration::from_secs(req.offline_after_seconds),
    )
    .map_err(|err| bad_request_error(err.to_string()))
}
