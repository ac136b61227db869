//! # DSR Registry
//!
//! 设备状态注册表对外门面：组合记录存储、过期判定与事件分发。
//!
//! - [`config`]：注册表参数及校验
//! - [`error`]：门面错误类型
//! - [`registry`]：`DeviceRegistry`（report / query / list / subscribe 等）
//! - [`view`]：带剩余时间的状态视图

pub mod config;
pub mod error;
pub mod registry;
pub mod view;

pub use config::*;
pub use error::*;
pub use registry::*;
pub use view::*;

pub use dsr_clock::{Clock, ManualClock, MonotonicClock};
pub use dsr_notify::{
    ChannelListener, DeliveryError, EventListener, LogListener, NotifierConfig, OverflowPolicy,
    SubscriptionHandle, SubscriptionStats,
};
pub use dsr_staleness::{StalenessStrategy, SweepReport, format_remaining};
pub use dsr_storage::{HistoryEntry, LateReportPolicy};
