use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::{models::ReplyEnvelope, IntegrationEventHandler, KeeperResult};
use tracing::debug;

use crate::scheduler::ServiceScheduler;

/// 生产端的回复处理器
///
/// 订阅在生产者自己的逻辑名称上，把回复信封交给调度器。
pub struct ReplyHandler {
    scheduler: Arc<ServiceScheduler>,
}

impl ReplyHandler {
    pub const NAME: &'static str = "reply_handler";

    pub fn new(scheduler: Arc<ServiceScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl IntegrationEventHandler for ReplyHandler {
    fn handler_name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, topic: &str, body: &[u8]) -> KeeperResult<()> {
        let envelope: ReplyEnvelope = serde_json::from_slice(body)?;
        debug!(
            "收到回复 {} -> {}: {}",
            envelope.destination_task_name, topic, envelope.outcome_code
        );
        self.scheduler.handle_reply(&envelope).await;
        Ok(())
    }
}
