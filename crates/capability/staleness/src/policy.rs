//! 阈值策略：全局默认值 + 按设备覆盖（对应设备各自的期望上报间隔）。

use domain::{DeviceId, InvalidThresholds, Thresholds};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct ThresholdPolicy {
    defaults: Thresholds,
    overrides: RwLock<HashMap<DeviceId, Thresholds>>,
}

impl ThresholdPolicy {
    pub fn new(defaults: Thresholds) -> Result<Self, InvalidThresholds> {
        defaults.validate()?;
        Ok(Self {
            defaults,
            overrides: RwLock::new(HashMap::new()),
        })
    }

    pub fn defaults(&self) -> Thresholds {
        self.defaults
    }

    /// 设备生效的阈值；读锁失败时退回全局默认值。
    pub fn for_device(&self, id: &DeviceId) -> Thresholds {
        self.overrides
            .read()
            .ok()
            .and_then(|map| map.get(id).copied())
            .unwrap_or(self.defaults)
    }

    /// 设置设备级阈值（可早于设备首次上报）。
    pub fn set_override(
        &self,
        id: DeviceId,
        thresholds: Thresholds,
    ) -> Result<(), InvalidThresholds> {
        thresholds.validate()?;
        if let Ok(mut map) = self.overrides.write() {
            map.insert(id, thresholds);
        }
        Ok(())
    }

    pub fn clear_override(&self, id: &DeviceId) -> bool {
        self.overrides
            .write()
            .map(|mut map| map.remove(id).is_some())
            .unwrap_or(false)
    }

    pub fn has_override(&self, id: &DeviceId) -> bool {
        self.overrides
            .read()
            .map(|map| map.contains_key(id))
            .unwrap_or(false)
    }
}
