//! # DSR Storage 模块
//!
//! 设备状态注册表的进程内存储层。
//!
//! ## 模块说明
//!
//! - [`records`]：设备记录存储（分片映射 + 单记录互斥），唯一持有 `DeviceRecord`
//! - [`history`]：每设备有界的状态变迁历史
//! - [`error`]：存储错误类型定义
//! - [`validation`]：设备 ID 规范化
//!
//! ## 并发约束
//!
//! - 不同设备的写入并行执行，同一设备串行
//! - 任意操作最多持有一把记录锁，扫描不会因设备总数放大上报延迟
//! - 读取只返回克隆快照，不暴露内部引用
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use dsr_storage::{DeviceRecordStore, LateReportPolicy};
//! use domain::{DeviceId, StatusPayload, Timestamp};
//!
//! let store = DeviceRecordStore::new();
//! let id = DeviceId::from("device-1");
//! let outcome = store.upsert(
//!     &id,
//!     StatusPayload::new(),
//!     Timestamp::from_secs(1),
//!     LateReportPolicy::Reject,
//!     |event, _record| println!("{:?}", event),
//! )?;
//! assert!(outcome.transitioned());
//! ```

pub mod error;
pub mod history;
pub mod records;
pub mod validation;

pub use error::*;
pub use history::*;
pub use records::*;
pub use validation::*;
