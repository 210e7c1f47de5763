use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::{
    models::{ReplyEnvelope, TaskDetail},
    IntegrationEventHandler, KeeperError, KeeperResult, MessageBus,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::subscriptions::{DeliveryDecision, SubscriptionsManager};

type Receiver = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

struct TopicQueue {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Receiver,
}

/// 投递统计
#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub published: AtomicU64,
    pub acked: AtomicU64,
    pub rejected: AtomicU64,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.acked.load(Ordering::SeqCst) + self.rejected.load(Ordering::SeqCst)
    }
}

/// 内存消息总线
///
/// 使用 Tokio channels 模拟持久化主题队列：订阅前发布的消息会保留在队列中，
/// 订阅后按顺序投递。确认语义与 RabbitMQ 实现一致，被拒绝的消息直接丢弃。
#[derive(Default)]
pub struct InMemoryEventBus {
    queues: RwLock<HashMap<String, TopicQueue>>,
    subscriptions: Arc<SubscriptionsManager>,
    consumers: Mutex<HashMap<String, JoinHandle<()>>>,
    stats: Arc<DeliveryStats>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        info!("Creating in-memory message bus");
        Self::default()
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// 等待累计投递（确认或拒绝）达到 `count` 条
    pub async fn wait_for_deliveries(&self, count: u64, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.stats.delivered() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    async fn queue(&self, topic: &str) -> (mpsc::UnboundedSender<Vec<u8>>, Receiver) {
        if let Some(queue) = self.queues.read().await.get(topic) {
            return (queue.sender.clone(), Arc::clone(&queue.receiver));
        }

        let mut queues = self.queues.write().await;
        let queue = queues.entry(topic.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            TopicQueue {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
            }
        });
        (queue.sender.clone(), Arc::clone(&queue.receiver))
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, body: &T) -> KeeperResult<()> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| KeeperError::Serialization(format!("序列化消息失败: {e}")))?;
        let (sender, _) = self.queue(topic).await;
        sender
            .send(payload)
            .map_err(|_| KeeperError::MessageQueue(format!("主题 {topic} 的队列已关闭")))?;
        self.stats.published.fetch_add(1, Ordering::SeqCst);
        debug!("消息已发布到内存主题: {}", topic);
        Ok(())
    }

    async fn start_consumer(&self, topic: &str) {
        let (_, receiver) = self.queue(topic).await;
        let subscriptions = Arc::clone(&self.subscriptions);
        let stats = Arc::clone(&self.stats);
        let topic_name = topic.to_string();

        let task = tokio::spawn(async move {
            let mut receiver = receiver.lock().await;
            while let Some(body) = receiver.recv().await {
                match subscriptions.dispatch(&topic_name, &body).await {
                    DeliveryDecision::Ack => stats.acked.fetch_add(1, Ordering::SeqCst),
                    DeliveryDecision::Reject => stats.rejected.fetch_add(1, Ordering::SeqCst),
                };
            }
        });

        if let Some(previous) = self.consumers.lock().await.insert(topic.to_string(), task) {
            previous.abort();
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryEventBus {
    async fn publish(&self, destination: &str, detail: &TaskDetail) -> KeeperResult<()> {
        self.publish_json(destination, detail).await
    }

    async fn reply(&self, destination: &str, envelope: &ReplyEnvelope) -> KeeperResult<()> {
        self.publish_json(destination, envelope).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn IntegrationEventHandler>,
    ) -> KeeperResult<()> {
        let replaced = self.subscriptions.add(topic, handler).await;
        if !replaced || !self.consumers.lock().await.contains_key(topic) {
            self.start_consumer(topic).await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str, handler_name: &str) -> KeeperResult<()> {
        if self.subscriptions.remove(topic, handler_name).await {
            if let Some(task) = self.consumers.lock().await.remove(topic) {
                task.abort();
            }
        }
        Ok(())
    }

    async fn close(&self) -> KeeperResult<()> {
        for (_, task) in self.consumers.lock().await.drain() {
            task.abort();
        }
        Ok(())
    }
}
