use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::{
    emit_log,
    models::{OutcomeCode, ReplyEnvelope, TaskDetail, TaskReceived},
    IntegrationEventHandler, KeeperResult, LogLevel, Mediator, MessageBus, ServiceDirectory,
};
use tracing::{debug, info, warn};

/// Handles tasks published to this consumer
pub struct TaskReceiver {
    directory: Arc<dyn ServiceDirectory>,
    bus: Arc<dyn MessageBus>,
    mediator: Arc<dyn Mediator>,
}

impl TaskReceiver {
    pub const NAME: &'static str = "task_receiver";

    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        bus: Arc<dyn MessageBus>,
        mediator: Arc<dyn Mediator>,
    ) -> Self {
        Self {
            directory,
            bus,
            mediator,
        }
    }

    /// Send the envelope to the active producer, if there is one
    async fn reply(&self, envelope: ReplyEnvelope) -> KeeperResult<()> {
        match self.directory.find_active_producer().await {
            Some(producer) => {
                self.bus.reply(producer.name(), &envelope).await?;
                debug!(
                    "Replied {} for task {} to {}",
                    envelope.outcome_code,
                    envelope.destination_task_name,
                    producer.name()
                );
                Ok(())
            }
            None => {
                emit_log(
                    self.mediator.as_ref(),
                    LogLevel::Warning,
                    format!(
                        "No active producer, dropping {} reply for task {}",
                        envelope.outcome_code, envelope.destination_task_name
                    ),
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl IntegrationEventHandler for TaskReceiver {
    fn handler_name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, topic: &str, body: &[u8]) -> KeeperResult<()> {
        let detail: TaskDetail = match serde_json::from_slice(body) {
            Ok(detail) => detail,
            Err(e) => {
                emit_log(
                    self.mediator.as_ref(),
                    LogLevel::Error,
                    format!("Failed to parse task published to {topic}: {e}"),
                );
                let envelope =
                    ReplyEnvelope::new(topic, OutcomeCode::ParseError).with_message(e.to_string());
                if let Err(reply_err) = self.reply(envelope).await {
                    warn!("Failed to send parse error reply: {}", reply_err);
                }
                return Err(e.into());
            }
        };

        info!("Received task {} ({})", detail.name, detail.id);
        let request = TaskReceived {
            task_id: detail.id,
            name: detail.name.clone(),
            payload: detail.task,
        };

        let (code, message) = match self.mediator.send(request).await {
            Ok(result) => (result.code, result.message),
            Err(e) => {
                emit_log(
                    self.mediator.as_ref(),
                    LogLevel::Error,
                    format!("Task {} failed: {}", detail.name, e),
                );
                (OutcomeCode::Failure, Some(e.to_string()))
            }
        };

        let mut envelope = ReplyEnvelope::new(detail.name, code).with_node_id(detail.id);
        envelope.message = message;
        self.reply(envelope).await
    }
}
