use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    errors::KeeperResult,
    models::{ReplyEnvelope, TaskDetail},
};

/// 集成事件处理器
///
/// 每个主题只注册一个处理器。返回 `Ok` 时消息被确认，返回 `Err` 时消息被拒绝且不重新入队。
#[async_trait]
pub trait IntegrationEventHandler: Send + Sync {
    /// 处理器名称，取消订阅时用于匹配
    fn handler_name(&self) -> &str;

    /// 处理一条消息
    async fn handle(&self, topic: &str, body: &[u8]) -> KeeperResult<()>;
}

/// 消息总线抽象接口
///
/// 以目标服务的逻辑名称同时作为主题与路由键，提供至少一次的持久化投递。
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 发布任务到目标服务
    async fn publish(&self, destination: &str, detail: &TaskDetail) -> KeeperResult<()>;

    /// 回复执行结果给目标服务
    async fn reply(&self, destination: &str, envelope: &ReplyEnvelope) -> KeeperResult<()>;

    /// 订阅主题，已有处理器时替换
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn IntegrationEventHandler>,
    ) -> KeeperResult<()>;

    /// 取消订阅，只有名称匹配时才移除
    async fn unsubscribe(&self, topic: &str, handler_name: &str) -> KeeperResult<()>;

    /// 关闭连接并停止所有消费循环
    async fn close(&self) -> KeeperResult<()>;
}
