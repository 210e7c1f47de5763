use std::time::Duration;

use keeper_core::{KeeperError, KeeperResult};
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// 连接状态事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// 连接报告错误或被服务端关闭
    Lost(String),
    /// 重新连接成功
    Reconnected,
}

/// 持久的 RabbitMQ 连接
///
/// 进程只持有一条长连接，每次操作打开短生命周期的通道。重连在同一把锁下串行执行，
/// 并发触发的重连只会有一个真正建立新连接。
pub struct RabbitMqConnection {
    url: String,
    connect_timeout: Duration,
    connection: RwLock<Option<Connection>>,
    reconnect_lock: Mutex<()>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl RabbitMqConnection {
    /// 建立连接
    pub async fn connect(url: impl Into<String>, connect_timeout: Duration) -> KeeperResult<Self> {
        let (events, _) = broadcast::channel(16);
        let connection = Self {
            url: url.into(),
            connect_timeout,
            connection: RwLock::new(None),
            reconnect_lock: Mutex::new(()),
            events,
        };
        connection.try_connect().await?;
        Ok(connection)
    }

    /// 订阅连接事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .read()
            .await
            .as_ref()
            .is_some_and(|c| c.status().connected())
    }

    /// 在重连锁下确保连接可用，已连接时直接返回
    pub async fn try_connect(&self) -> KeeperResult<()> {
        let _guard = self.reconnect_lock.lock().await;

        if self.is_connected().await {
            return Ok(());
        }

        let had_connection = self.connection.read().await.is_some();
        if had_connection {
            warn!("RabbitMQ连接不可用，尝试重新连接: {}", self.url);
        }

        let connection = tokio::time::timeout(
            self.connect_timeout,
            Connection::connect(&self.url, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| KeeperError::MessageQueue(format!("连接RabbitMQ超时: {}", self.url)))?
        .map_err(|e| KeeperError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let events = self.events.clone();
        connection.on_error(move |e| {
            error!("RabbitMQ连接出错: {}", e);
            let _ = events.send(ConnectionEvent::Lost(e.to_string()));
        });

        *self.connection.write().await = Some(connection);
        info!("成功连接到RabbitMQ: {}", self.url);

        if had_connection {
            let _ = self.events.send(ConnectionEvent::Reconnected);
        }
        Ok(())
    }

    /// 创建新通道，连接失效时先内联重连一次
    pub async fn create_channel(&self) -> KeeperResult<Channel> {
        if !self.is_connected().await {
            self.try_connect().await?;
        }

        match self.open_channel().await {
            Ok(channel) => Ok(channel),
            Err(e) => {
                warn!("创建通道失败，重连后重试: {}", e);
                self.try_connect().await?;
                self.open_channel().await
            }
        }
    }

    async fn open_channel(&self) -> KeeperResult<Channel> {
        let guard = self.connection.read().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| KeeperError::MessageQueue("RabbitMQ连接尚未建立".to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| KeeperError::MessageQueue(format!("创建通道失败: {e}")))?;
        debug!("创建RabbitMQ通道: {}", channel.id());
        Ok(channel)
    }

    /// 关闭连接
    pub async fn close(&self) -> KeeperResult<()> {
        let _guard = self.reconnect_lock.lock().await;
        if let Some(connection) = self.connection.write().await.take() {
            if connection.status().connected() {
                connection
                    .close(200, "正常关闭")
                    .await
                    .map_err(|e| KeeperError::MessageQueue(format!("关闭连接失败: {e}")))?;
            }
            info!("RabbitMQ连接已关闭");
        }
        Ok(())
    }
}
