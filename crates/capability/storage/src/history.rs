//! 状态变迁历史
//!
//! 每台设备保留最近 `limit` 条变迁，超出后淘汰最旧的一条。

use crate::error::StorageError;
use domain::{DeviceId, DeviceRecord, DeviceState, Timestamp, TransitionEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// 默认每设备保留条数。
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// 一条状态变迁历史。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub device_id: DeviceId,
    pub at: Timestamp,
    pub from: Option<DeviceState>,
    pub to: DeviceState,
    /// 变迁发生时设备的最后上报时间。
    pub last_seen_at: Timestamp,
    pub message: String,
}

impl HistoryEntry {
    pub fn from_transition(event: &TransitionEvent, record: &DeviceRecord) -> Self {
        Self {
            device_id: event.device_id.clone(),
            at: event.at,
            from: event.from,
            to: event.to,
            last_seen_at: record.last_seen_at,
            message: format!("device status changed to {}", event.to),
        }
    }
}

pub struct HistoryStore {
    entries: RwLock<HashMap<DeviceId, VecDeque<HistoryEntry>>>,
    limit: usize,
}

impl HistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 追加一条记录；`limit` 为 0 时不保留历史。
    pub fn append(&self, entry: HistoryEntry) -> Result<(), StorageError> {
        if self.limit == 0 {
            return Ok(());
        }
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::lock_failed())?;
        let items = map.entry(entry.device_id.clone()).or_default();
        items.push_back(entry);
        while items.len() > self.limit {
            items.pop_front();
        }
        Ok(())
    }

    /// 按时间先后返回设备历史。
    pub fn list(&self, id: &DeviceId) -> Result<Vec<HistoryEntry>, StorageError> {
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::lock_failed())?;
        Ok(map
            .get(id)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn latest(&self, id: &DeviceId) -> Result<Option<HistoryEntry>, StorageError> {
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::lock_failed())?;
        Ok(map.get(id).and_then(|items| items.back().cloned()))
    }

    pub fn remove(&self, id: &DeviceId) -> Result<(), StorageError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::lock_failed())?;
        map.remove(id);
        Ok(())
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
