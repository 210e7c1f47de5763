use async_trait::async_trait;

use crate::{
    errors::KeeperResult,
    models::{EventResult, Notification, TaskReceived},
};

/// 进程内请求/通知分发器
#[async_trait]
pub trait Mediator: Send + Sync {
    /// 把收到的任务交给应用代码处理，等待结果
    async fn send(&self, request: TaskReceived) -> KeeperResult<EventResult>;

    /// 广播通知，不等待任何监听者
    fn publish(&self, notification: Notification);
}

/// 应用侧的任务处理器
#[async_trait]
pub trait TaskRequestHandler: Send + Sync {
    async fn handle(&self, request: TaskReceived) -> KeeperResult<EventResult>;
}
