use std::collections::HashMap;
use std::sync::Arc;

use keeper_core::IntegrationEventHandler;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::observability::MetricsCollector;

/// 消息处理后的确认决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    /// 处理成功，确认消息
    Ack,
    /// 处理失败，拒绝且不重新入队
    Reject,
}

/// 主题到处理器的映射，每个主题只有一个处理器
pub struct SubscriptionsManager {
    handlers: RwLock<HashMap<String, Arc<dyn IntegrationEventHandler>>>,
    metrics: MetricsCollector,
}

impl Default for SubscriptionsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionsManager {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            metrics: MetricsCollector::new(),
        }
    }

    /// 注册处理器，返回是否替换了已有处理器
    pub async fn add(&self, topic: &str, handler: Arc<dyn IntegrationEventHandler>) -> bool {
        let mut handlers = self.handlers.write().await;
        let replaced = handlers.insert(topic.to_string(), handler).is_some();
        debug!("主题 {} 注册处理器，替换已有处理器: {}", topic, replaced);
        replaced
    }

    /// 移除处理器，只有名称匹配时才移除
    pub async fn remove(&self, topic: &str, handler_name: &str) -> bool {
        let mut handlers = self.handlers.write().await;
        match handlers.get(topic) {
            Some(existing) if existing.handler_name() == handler_name => {
                handlers.remove(topic);
                true
            }
            Some(existing) => {
                warn!(
                    "主题 {} 的处理器为 {}，忽略对 {} 的取消订阅",
                    topic,
                    existing.handler_name(),
                    handler_name
                );
                false
            }
            None => false,
        }
    }

    pub async fn handler(&self, topic: &str) -> Option<Arc<dyn IntegrationEventHandler>> {
        self.handlers.read().await.get(topic).cloned()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// 把消息交给主题的处理器，并给出确认决定
    ///
    /// 没有处理器或处理器返回错误时拒绝消息。
    pub async fn dispatch(&self, topic: &str, body: &[u8]) -> DeliveryDecision {
        let Some(handler) = self.handler(topic).await else {
            warn!("主题 {} 没有注册处理器，拒绝消息", topic);
            self.metrics.record_message_rejected();
            return DeliveryDecision::Reject;
        };

        match handler.handle(topic, body).await {
            Ok(()) => {
                self.metrics.record_message_acked();
                DeliveryDecision::Ack
            }
            Err(e) => {
                self.metrics.record_message_rejected();
                error!(
                    "处理器 {} 处理主题 {} 的消息失败: {}",
                    handler.handler_name(),
                    topic,
                    e
                );
                DeliveryDecision::Reject
            }
        }
    }
}
