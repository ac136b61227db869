//! 设备记录存储
//!
//! 分片 `RwLock<HashMap>` 只保护“设备 ID → 记录槽位”的映射，
//! 每条记录各自持有一把 `Mutex`：
//! - 不同设备的上报互不阻塞（仅在同一分片上短暂持有读锁）
//! - 同一设备的上报、扫描串行执行
//! - 任何时刻最多持有一把记录锁；加锁顺序固定为 分片 → 记录
//!
//! 所有读取返回克隆快照，调用方无法绕过锁修改内部记录。
//!
//! 删除时在记录锁内给槽位打上 `removed` 标记；已取得旧槽位的并发写入
//! 加锁后看到标记会重新查找，不会写进已脱离映射的记录。

use crate::error::StorageError;
use domain::{DeviceId, DeviceRecord, DeviceState, StatusPayload, Timestamp, TransitionEvent};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// 默认分片数。
pub const DEFAULT_SHARDS: usize = 16;

struct SlotCell {
    record: Mutex<DeviceRecord>,
    /// 只在持有记录锁时写入。
    removed: AtomicBool,
}

impl SlotCell {
    fn new(record: DeviceRecord) -> Self {
        Self {
            record: Mutex::new(record),
            removed: AtomicBool::new(false),
        }
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

type Slot = Arc<SlotCell>;
type Shard = RwLock<HashMap<DeviceId, Slot>>;

/// 乱序上报（时间早于 `last_seen_at`）的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateReportPolicy {
    /// 丢弃，记录保持不变。
    #[default]
    Reject,
    /// 只替换载荷，不改变状态与时间戳（非权威合并）。
    MergePayload,
}

/// upsert 结果。
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// 操作后的记录快照。
    pub record: DeviceRecord,
    /// 本次上报触发的状态变迁。
    pub transition: Option<TransitionEvent>,
    /// 上报是否被采纳为最新（乱序上报为 false）。
    pub applied: bool,
}

impl UpsertOutcome {
    pub fn transitioned(&self) -> bool {
        self.transition.is_some()
    }
}

/// 一次 `list` 的结果：成员在快照时确定，每条记录独立原子复制。
#[derive(Debug, Clone, Default)]
pub struct RecordSnapshot {
    records: Vec<DeviceRecord>,
}

impl RecordSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeviceRecord> {
        self.records.iter()
    }
}

impl IntoIterator for RecordSnapshot {
    type Item = DeviceRecord;
    type IntoIter = std::vec::IntoIter<DeviceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// 设备记录存储（进程内，线程安全）。
pub struct DeviceRecordStore {
    shards: Box<[Shard]>,
}

impl DeviceRecordStore {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// 指定分片数创建；0 按 1 处理。
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 写入一次上报。
    ///
    /// `on_transition` 在持有该设备记录锁时调用，保证同一设备的事件按产生顺序发出。
    pub fn upsert(
        &self,
        id: &DeviceId,
        payload: StatusPayload,
        observed_at: Timestamp,
        policy: LateReportPolicy,
        on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
    ) -> Result<UpsertOutcome, StorageError> {
        let mut map = loop {
            if let Some(slot) = self.slot(id)? {
                let mut record = lock_record(&slot)?;
                // 取得槽位后被删除：重新查找
                if slot.is_removed() {
                    continue;
                }
                return Ok(apply_report(
                    &mut *record,
                    payload,
                    observed_at,
                    policy,
                    on_transition,
                ));
            }

            let map = self
                .shard(id)
                .write()
                .map_err(|_| StorageError::lock_failed())?;
            // 获取写锁期间可能已被并发创建
            let Some(slot) = map.get(id).cloned() else {
                break map;
            };
            drop(map);
            let mut record = lock_record(&slot)?;
            if slot.is_removed() {
                continue;
            }
            return Ok(apply_report(
                &mut *record,
                payload,
                observed_at,
                policy,
                on_transition,
            ));
        };

        let created = DeviceRecord::new_online(id.clone(), Some(payload), observed_at);
        let slot: Slot = Arc::new(SlotCell::new(created));
        let record = lock_record(&slot)?;
        map.insert(id.clone(), slot.clone());
        drop(map);

        let event = TransitionEvent {
            device_id: id.clone(),
            from: None,
            to: DeviceState::Online,
            at: observed_at,
        };
        on_transition(&event, &*record);
        Ok(UpsertOutcome {
            record: record.clone(),
            transition: Some(event),
            applied: true,
        })
    }

    /// Online → Stale；其他状态下为空操作。
    pub fn mark_stale(
        &self,
        id: &DeviceId,
        at: Timestamp,
        on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
    ) -> Result<bool, StorageError> {
        self.mark_stale_if(id, at, |_| true, on_transition)
    }

    /// Stale → Offline；其他状态下为空操作。
    pub fn mark_offline(
        &self,
        id: &DeviceId,
        at: Timestamp,
        on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
    ) -> Result<bool, StorageError> {
        self.mark_offline_if(id, at, |_| true, on_transition)
    }

    /// 在记录锁内再次判定 `predicate`，成立且当前为 Online 时转为 Stale。
    pub fn mark_stale_if(
        &self,
        id: &DeviceId,
        at: Timestamp,
        predicate: impl FnOnce(&DeviceRecord) -> bool,
        on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
    ) -> Result<bool, StorageError> {
        self.transition_if(
            id,
            DeviceState::Online,
            DeviceState::Stale,
            at,
            predicate,
            on_transition,
        )
    }

    /// 在记录锁内再次判定 `predicate`，成立且当前为 Stale 时转为 Offline。
    pub fn mark_offline_if(
        &self,
        id: &DeviceId,
        at: Timestamp,
        predicate: impl FnOnce(&DeviceRecord) -> bool,
        on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
    ) -> Result<bool, StorageError> {
        self.transition_if(
            id,
            DeviceState::Stale,
            DeviceState::Offline,
            at,
            predicate,
            on_transition,
        )
    }

    pub fn get(&self, id: &DeviceId) -> Result<Option<DeviceRecord>, StorageError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let record = lock_record(&slot)?;
        if slot.is_removed() {
            return Ok(None);
        }
        Ok(Some(record.clone()))
    }

    /// 全量快照（按设备 ID 排序）。
    ///
    /// 分片读锁只在收集槽位时持有；复制每条记录时只持有该记录的锁。
    pub fn list(&self) -> Result<RecordSnapshot, StorageError> {
        let slots = self.slots()?;
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            let record = lock_record(&slot)?;
            if !slot.is_removed() {
                records.push(record.clone());
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(RecordSnapshot { records })
    }

    /// 当前全部设备 ID（无序）。
    pub fn ids(&self) -> Result<Vec<DeviceId>, StorageError> {
        let mut ids = Vec::new();
        for shard in self.shards.iter() {
            let map = shard.read().map_err(|_| StorageError::lock_failed())?;
            ids.extend(map.keys().cloned());
        }
        Ok(ids)
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let mut total = 0;
        for shard in self.shards.iter() {
            total += shard.read().map_err(|_| StorageError::lock_failed())?.len();
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// 删除记录（保留策略的挂钩），返回被删除的最后快照。
    ///
    /// `on_removed` 在持有分片写锁与记录锁时调用：此前的写入都已完成，
    /// 同一设备的新记录要等它返回后才能创建。
    pub fn remove(
        &self,
        id: &DeviceId,
        on_removed: impl FnOnce(&DeviceRecord),
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let mut map = self
            .shard(id)
            .write()
            .map_err(|_| StorageError::lock_failed())?;
        let Some(slot) = map.get(id).cloned() else {
            return Ok(None);
        };
        let record = lock_record(&slot)?;
        map.remove(id);
        slot.removed.store(true, Ordering::Release);
        on_removed(&*record);
        Ok(Some(record.clone()))
    }

    /// 恢复已知记录（启动时装载），不产生事件；已存在的设备跳过并返回 false。
    pub fn restore(&self, record: DeviceRecord) -> Result<bool, StorageError> {
        let mut map = self
            .shard(&record.id)
            .write()
            .map_err(|_| StorageError::lock_failed())?;
        if map.contains_key(&record.id) {
            return Ok(false);
        }
        map.insert(record.id.clone(), Arc::new(SlotCell::new(record)));
        Ok(true)
    }

    fn transition_if(
        &self,
        id: &DeviceId,
        expected: DeviceState,
        next: DeviceState,
        at: Timestamp,
        predicate: impl FnOnce(&DeviceRecord) -> bool,
        on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
    ) -> Result<bool, StorageError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(false);
        };
        let mut record = lock_record(&slot)?;
        if slot.is_removed() || record.state != expected || !predicate(&*record) {
            return Ok(false);
        }
        record.state = next;
        record.state_changed_at = at;
        let event = TransitionEvent {
            device_id: id.clone(),
            from: Some(expected),
            to: next,
            at,
        };
        on_transition(&event, &*record);
        Ok(true)
    }

    fn shard(&self, id: &DeviceId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    fn slot(&self, id: &DeviceId) -> Result<Option<Slot>, StorageError> {
        let map = self
            .shard(id)
            .read()
            .map_err(|_| StorageError::lock_failed())?;
        Ok(map.get(id).cloned())
    }

    fn slots(&self) -> Result<Vec<Slot>, StorageError> {
        let mut slots = Vec::new();
        for shard in self.shards.iter() {
            let map = shard.read().map_err(|_| StorageError::lock_failed())?;
            slots.extend(map.values().cloned());
        }
        Ok(slots)
    }
}

impl Default for DeviceRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_record(slot: &Slot) -> Result<MutexGuard<'_, DeviceRecord>, StorageError> {
    slot.record.lock().map_err(|_| StorageError::lock_failed())
}

fn apply_report(
    record: &mut DeviceRecord,
    payload: StatusPayload,
    observed_at: Timestamp,
    policy: LateReportPolicy,
    on_transition: impl FnOnce(&TransitionEvent, &DeviceRecord),
) -> UpsertOutcome {
    if observed_at < record.last_seen_at {
        if policy == LateReportPolicy::MergePayload {
            record.last_payload = Some(payload);
        }
        return UpsertOutcome {
            record: record.clone(),
            transition: None,
            applied: false,
        };
    }

    record.last_payload = Some(payload);
    record.last_seen_at = observed_at;
    let transition = if record.state != DeviceState::Online {
        let from = record.state;
        record.state = DeviceState::Online;
        record.state_changed_at = observed_at;
        let event = TransitionEvent {
            device_id: record.id.clone(),
            from: Some(from),
            to: DeviceState::Online,
            at: observed_at,
        };
        on_transition(&event, &*record);
        Some(event)
    } else {
        None
    };
    UpsertOutcome {
        record: record.clone(),
        transition,
        applied: true,
    }
}
