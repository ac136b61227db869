//! 状态变迁事件分发
//!
//! 每个订阅者拥有独立的有界队列和投递任务：
//! - `publish` 只做入队，不等待任何订阅者，可以在记录锁内调用
//! - 队列满时按 [`OverflowPolicy`] 丢弃，并计数
//! - 订阅者失败只影响自身（记日志、计数），不会传播给上报方
//! - 同一订阅者按入队顺序串行投递，因此同一设备的事件保持产生顺序

pub mod listener;
pub mod notifier;

pub use listener::*;
pub use notifier::*;

/// 订阅者处理失败。
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("listener failed: {0}")]
    Listener(String),
    #[error("listener closed")]
    Closed,
}

/// 分发器错误。
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier is shut down")]
    Closed,
    /// 投递任务需要 tokio 运行时。
    #[error("no tokio runtime available")]
    NoRuntime,
}
