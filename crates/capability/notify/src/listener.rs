//! 订阅者接口与内置实现。

use crate::DeliveryError;
use async_trait::async_trait;
use domain::TransitionEvent;
use tokio::sync::mpsc;
use tracing::info;

/// 事件订阅者。
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &TransitionEvent) -> Result<(), DeliveryError>;

    /// 日志中使用的名称。
    fn name(&self) -> &str {
        "listener"
    }
}

/// 转发到 mpsc 通道（用于接线与测试）。
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::Sender<TransitionEvent>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::Sender<TransitionEvent>) -> Self {
        Self { sender }
    }

    /// 创建监听器及接收端。
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventListener for ChannelListener {
    async fn on_event(&self, event: &TransitionEvent) -> Result<(), DeliveryError> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// 每个事件写一行结构化日志。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

#[async_trait]
impl EventListener for LogListener {
    async fn on_event(&self, event: &TransitionEvent) -> Result<(), DeliveryError> {
        info!(
            target: "dsr.notify",
            device_id = %event.device_id,
            from = event.from.map(|state| state.as_str()).unwrap_or("none"),
            to = %event.to,
            at_ms = event.at.as_millis(),
            kind = event.kind(),
            "device_transition"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
