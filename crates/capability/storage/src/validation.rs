//! 验证辅助函数
//!
//! - normalize_device_id：去除首尾空格并要求非空

use crate::error::StorageError;
use domain::DeviceId;

/// 规范化设备 ID
///
/// 去除首尾空格；空字符串视为非法。
pub fn normalize_device_id(raw: &str) -> Result<DeviceId, StorageError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StorageError::new("device_id required"));
    }
    Ok(DeviceId::new(trimmed))
}
