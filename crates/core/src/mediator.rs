use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    errors::{KeeperError, KeeperResult},
    models::{EventResult, Notification, TaskReceived},
    traits::{Mediator, TaskRequestHandler},
};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// 进程内分发器
///
/// 通知经 `broadcast` 通道扇出给任意数量的监听者；任务请求交给唯一的
/// [`TaskRequestHandler`]。没有监听者时通知被直接丢弃。
pub struct InProcessMediator {
    sender: broadcast::Sender<Notification>,
    handler: Option<Arc<dyn TaskRequestHandler>>,
}

impl InProcessMediator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn TaskRequestHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// 订阅通知
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for InProcessMediator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mediator for InProcessMediator {
    async fn send(&self, request: TaskReceived) -> KeeperResult<EventResult> {
        match &self.handler {
            Some(handler) => handler.handle(request).await,
            None => Err(KeeperError::Handler(format!(
                "没有注册任务处理器，无法处理任务 {}",
                request.name
            ))),
        }
    }

    fn publish(&self, notification: Notification) {
        // 没有接收者时 send 返回错误，忽略即可
        let _ = self.sender.send(notification);
    }
}
