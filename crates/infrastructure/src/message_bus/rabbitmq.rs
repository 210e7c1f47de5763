use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use keeper_core::{
    config::MessageQueueConfig,
    models::{ReplyEnvelope, TaskDetail},
    IntegrationEventHandler, KeeperError, KeeperResult, MessageBus,
};
use lapin::{
    options::*, publisher_confirm::Confirmation, types::FieldTable, BasicProperties, Channel,
    ExchangeKind,
};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionEvent, RabbitMqConnection};
use super::subscriptions::{DeliveryDecision, SubscriptionsManager};

struct ConsumerHandle {
    consumer_tag: String,
    task: JoinHandle<()>,
}

/// 基于 RabbitMQ 的消息总线
///
/// 使用一个 direct 交换机，每个主题对应一个同名的持久化队列，路由键与主题相同。
/// 消息以持久化模式发布；消费端手动确认，处理失败时拒绝且不重新入队。
pub struct RabbitMqEventBus {
    connection: Arc<RabbitMqConnection>,
    exchange_name: String,
    subscriptions: Arc<SubscriptionsManager>,
    consumer_channel: Mutex<Option<Channel>>,
    consumers: Mutex<HashMap<String, ConsumerHandle>>,
    shutdown_tx: broadcast::Sender<()>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl RabbitMqEventBus {
    /// 连接 RabbitMQ 并启动连接监督任务
    pub async fn new(config: &MessageQueueConfig) -> KeeperResult<Arc<Self>> {
        let connection = RabbitMqConnection::connect(
            config.url.clone(),
            Duration::from_secs(config.connection_timeout_seconds),
        )
        .await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        let bus = Arc::new(Self {
            connection: Arc::new(connection),
            exchange_name: config.exchange_name.clone(),
            subscriptions: Arc::new(SubscriptionsManager::new()),
            consumer_channel: Mutex::new(None),
            consumers: Mutex::new(HashMap::new()),
            shutdown_tx,
            supervisor: Mutex::new(None),
        });

        let handle = Self::spawn_supervisor(Arc::downgrade(&bus), &bus);
        *bus.supervisor.lock().await = Some(handle);

        info!("RabbitMQ消息总线已启动，交换机: {}", bus.exchange_name);
        Ok(bus)
    }

    /// 监听连接事件：连接丢失时重连，重连成功后重新订阅所有主题
    fn spawn_supervisor(weak: Weak<Self>, bus: &Arc<Self>) -> JoinHandle<()> {
        let mut events = bus.connection.subscribe_events();
        let mut shutdown_rx = bus.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(bus) = weak.upgrade() else { break };
                        match event {
                            Ok(ConnectionEvent::Lost(reason)) => {
                                warn!("RabbitMQ连接丢失: {}，开始重连", reason);
                                if let Err(e) = bus.connection.try_connect().await {
                                    error!("RabbitMQ重连失败: {}", e);
                                }
                            }
                            Ok(ConnectionEvent::Reconnected) => {
                                if let Err(e) = bus.resubscribe_all().await {
                                    error!("重连后重新订阅失败: {}", e);
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!("连接事件积压，跳过 {} 条", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("连接监督任务收到关闭信号");
                        break;
                    }
                }
            }
        })
    }

    async fn declare_exchange(&self, channel: &Channel) -> KeeperResult<()> {
        channel
            .exchange_declare(
                &self.exchange_name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                KeeperError::MessageQueue(format!("声明交换机 {} 失败: {e}", self.exchange_name))
            })
    }

    /// 声明主题的持久化队列并绑定到交换机
    async fn declare_topic(&self, channel: &Channel, topic: &str) -> KeeperResult<()> {
        channel
            .queue_declare(
                topic,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| KeeperError::MessageQueue(format!("声明队列 {topic} 失败: {e}")))?;

        channel
            .queue_bind(
                topic,
                &self.exchange_name,
                topic,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| KeeperError::MessageQueue(format!("绑定队列 {topic} 失败: {e}")))?;

        debug!("队列 {} 已声明并绑定到 {}", topic, self.exchange_name);
        Ok(())
    }

    async fn publish_json<T: Serialize>(&self, routing_key: &str, body: &T) -> KeeperResult<()> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| KeeperError::Serialization(format!("序列化消息失败: {e}")))?;

        // 通道不能并发复用，每次发布使用独立通道
        let channel = self.connection.create_channel().await?;
        let result = self.publish_on(&channel, routing_key, &payload).await;
        if let Err(e) = channel.close(200, "OK").await {
            debug!("关闭发布通道失败: {}", e);
        }
        result
    }

    async fn publish_on(&self, channel: &Channel, routing_key: &str, payload: &[u8]) -> KeeperResult<()> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| KeeperError::MessageQueue(format!("开启发布确认失败: {e}")))?;
        self.declare_exchange(channel).await?;
        self.declare_topic(channel, routing_key).await?;

        let confirm = channel
            .basic_publish(
                &self.exchange_name,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // 2 = persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| {
                KeeperError::MessageQueue(format!("发布消息到 {routing_key} 失败: {e}"))
            })?;

        let confirmation = confirm
            .await
            .map_err(|e| KeeperError::MessageQueue(format!("消息发布确认失败: {e}")))?;

        match confirmation {
            Confirmation::Nack(_) => Err(KeeperError::MessageQueue(format!(
                "消息被拒绝: {routing_key}"
            ))),
            Confirmation::Ack(Some(_)) => {
                warn!("消息无法路由: {}", routing_key);
                Ok(())
            }
            _ => {
                debug!("消息已发布: {}", routing_key);
                Ok(())
            }
        }
    }

    async fn consumer_channel(&self) -> KeeperResult<Channel> {
        let mut guard = self.consumer_channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        let channel = self.connection.create_channel().await?;
        self.declare_exchange(&channel).await?;
        *guard = Some(channel.clone());
        Ok(channel)
    }

    async fn start_consumer(&self, topic: &str) -> KeeperResult<()> {
        let channel = self.consumer_channel().await?;
        self.declare_topic(&channel, topic).await?;

        let consumer_tag = format!("{topic}-{}", uuid::Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                topic,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| KeeperError::MessageQueue(format!("创建消费者失败: {e}")))?;

        let subscriptions = Arc::clone(&self.subscriptions);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let topic_name = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    delivery = consumer.next() => {
                        match delivery {
                            Some(Ok(delivery)) => {
                                let decision = subscriptions.dispatch(&topic_name, &delivery.data).await;
                                let outcome = match decision {
                                    DeliveryDecision::Ack => delivery
                                        .acker
                                        .ack(BasicAckOptions::default())
                                        .await,
                                    DeliveryDecision::Reject => delivery
                                        .acker
                                        .reject(BasicRejectOptions { requeue: false })
                                        .await,
                                };
                                if let Err(e) = outcome {
                                    error!("确认主题 {} 的消息失败: {}", topic_name, e);
                                }
                            }
                            Some(Err(e)) => {
                                error!("主题 {} 的消费者出错: {}", topic_name, e);
                                break;
                            }
                            None => {
                                debug!("主题 {} 的消费者已结束", topic_name);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("主题 {} 的消费者收到关闭信号", topic_name);
                        break;
                    }
                }
            }
        });

        let previous = self.consumers.lock().await.insert(
            topic.to_string(),
            ConsumerHandle { consumer_tag, task },
        );
        if let Some(previous) = previous {
            previous.task.abort();
        }

        info!("开始消费主题: {}", topic);
        Ok(())
    }

    async fn resubscribe_all(&self) -> KeeperResult<()> {
        for (_, handle) in self.consumers.lock().await.drain() {
            handle.task.abort();
        }
        *self.consumer_channel.lock().await = None;

        let topics = self.subscriptions.topics().await;
        info!("重连后重新订阅 {} 个主题", topics.len());
        for topic in topics {
            self.start_consumer(&topic).await?;
        }
        Ok(())
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }
}

#[async_trait]
impl MessageBus for RabbitMqEventBus {
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
        if replaced && self.consumers.lock().await.contains_key(topic) {
            debug!("主题 {} 已有消费者，仅替换处理器", topic);
            return Ok(());
        }
        self.start_consumer(topic).await
    }

    async fn unsubscribe(&self, topic: &str, handler_name: &str) -> KeeperResult<()> {
        if !self.subscriptions.remove(topic, handler_name).await {
            return Ok(());
        }

        let handle = self.consumers.lock().await.remove(topic);
        let mut channel_guard = self.consumer_channel.lock().await;

        if let (Some(handle), Some(channel)) = (handle, channel_guard.as_ref()) {
            if let Err(e) = channel
                .basic_cancel(&handle.consumer_tag, BasicCancelOptions::default())
                .await
            {
                warn!("取消消费者 {} 失败: {}", handle.consumer_tag, e);
            }
            handle.task.abort();

            channel
                .queue_unbind(topic, &self.exchange_name, topic, FieldTable::default())
                .await
                .map_err(|e| KeeperError::MessageQueue(format!("解绑队列 {topic} 失败: {e}")))?;
        }

        if self.subscriptions.is_empty().await {
            if let Some(channel) = channel_guard.take() {
                if let Err(e) = channel.close(200, "OK").await {
                    debug!("关闭消费通道失败: {}", e);
                }
            }
        }

        info!("已取消订阅主题: {}", topic);
        Ok(())
    }

    async fn close(&self) -> KeeperResult<()> {
        let _ = self.shutdown_tx.send(());

        for (_, handle) in self.consumers.lock().await.drain() {
            let _ = handle.task.await;
        }
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            let _ = supervisor.await;
        }
        if let Some(channel) = self.consumer_channel.lock().await.take() {
            if let Err(e) = channel.close(200, "OK").await {
                debug!("关闭消费通道失败: {}", e);
            }
        }

        self.connection.close().await
    }
}
