//! 过期判定
//!
//! - [`policy`]：全局阈值与按设备覆盖的阈值
//! - [`evaluate`]：惰性求值（只计算有效状态，不修改存储）与剩余时间
//! - [`sweep`]：主动扫描与可取消的周期任务

pub mod evaluate;
pub mod policy;
pub mod sweep;

pub use evaluate::*;
pub use policy::*;
pub use sweep::*;

/// 过期判定方式。
///
/// `Lazy` 只影响读取视图，不会发出 Stale/Offline 事件；需要事件通知时必须使用 `ActiveSweep`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalenessStrategy {
    #[default]
    ActiveSweep,
    Lazy,
}
