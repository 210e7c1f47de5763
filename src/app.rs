use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use keeper_core::{
    config::{AppConfig, MessageQueueType},
    models::{EventResult, ServiceAdvertisement, ServiceRole, TaskEntity, TaskReceived},
    InProcessMediator, KeeperResult, KeyValueStore, MessageBus, TaskRequestHandler,
};
use keeper_dispatcher::{ReplyHandler, ServiceScheduler};
use keeper_infrastructure::{
    InMemoryEventBus, InMemoryKeyValueStore, RabbitMqEventBus, RedisKeyValueStore,
};
use keeper_registry::ServiceRegistry;
use keeper_worker::TaskReceiver;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 主应用程序
///
/// 生产者运行调度器并订阅回复，消费者运行任务接收器；两者都运行注册表。
pub struct Application {
    config: AppConfig,
    role: ServiceRole,
    bus: Arc<dyn MessageBus>,
    mediator: Arc<InProcessMediator>,
    registry: Arc<ServiceRegistry>,
    scheduler: Option<Arc<ServiceScheduler>>,
}

impl Application {
    /// 按配置创建共享存储与消息总线，然后组装应用
    pub async fn new(config: AppConfig, role: ServiceRole) -> Result<Self> {
        info!("初始化应用程序，角色: {}", role);

        let store = create_store(&config).await?;
        let bus = create_message_bus(&config).await?;
        let host = match &config.service.host {
            Some(host) => host.clone(),
            None => local_hostname()?,
        };

        Self::with_backends(config, role, host, store, bus, None).await
    }

    /// 使用给定的存储与总线组装应用
    ///
    /// 消费者未指定 `handler` 时使用 [`LoggingTaskHandler`]。
    pub async fn with_backends(
        config: AppConfig,
        role: ServiceRole,
        host: String,
        store: Arc<dyn KeyValueStore>,
        bus: Arc<dyn MessageBus>,
        handler: Option<Arc<dyn TaskRequestHandler>>,
    ) -> Result<Self> {
        let service = &config.service;
        let mut advertisement = ServiceAdvertisement::new(
            &service.name,
            host,
            role,
            Duration::from_secs(service.lease_seconds),
            Duration::from_secs(service.heartbeat_seconds),
        )
        .context("创建服务通告失败")?
        .with_description(&service.description);
        if let Some(schema) = &service.payload_schema {
            advertisement = advertisement.with_payload_schema(schema);
        }

        let mut mediator = InProcessMediator::new();
        if role == ServiceRole::Consumer {
            let handler: Arc<dyn TaskRequestHandler> =
                handler.unwrap_or_else(|| Arc::new(LoggingTaskHandler));
            mediator = mediator.with_handler(handler);
        }
        let mediator = Arc::new(mediator);

        let registry = ServiceRegistry::new(
            store,
            mediator.clone(),
            advertisement,
            service.duplicate_policy,
        )
        .await
        .context("创建注册表失败")?;

        let scheduler = (role == ServiceRole::Producer).then(|| {
            ServiceScheduler::new(
                registry.clone(),
                bus.clone(),
                mediator.clone(),
                Duration::from_secs(config.scheduler.specific_time_poll_seconds),
            )
        });

        Ok(Self {
            config,
            role,
            bus,
            mediator,
            registry,
            scheduler,
        })
    }

    /// 启动注册表，订阅本服务的主题，生产者加载任务文件
    pub async fn start(&self) -> Result<()> {
        self.registry.start().await.context("启动注册表失败")?;

        let topic = self.config.service.name.as_str();
        match &self.scheduler {
            Some(scheduler) => {
                self.bus
                    .subscribe(topic, Arc::new(ReplyHandler::new(scheduler.clone())))
                    .await
                    .context("订阅回复主题失败")?;

                if let Some(path) = &self.config.scheduler.tasks_file {
                    for task in load_tasks_file(path)? {
                        let name = task.name.clone();
                        if let Err(e) = scheduler.add_task(task).await {
                            error!("注册任务 {} 失败: {}", name, e);
                        }
                    }
                }
            }
            None => {
                let receiver = TaskReceiver::new(
                    self.registry.clone(),
                    self.bus.clone(),
                    self.mediator.clone(),
                );
                self.bus
                    .subscribe(topic, Arc::new(receiver))
                    .await
                    .context("订阅任务主题失败")?;
            }
        }

        info!("{} 已启动，订阅主题: {}", self.role, topic);
        Ok(())
    }

    /// 停止调度、关闭总线，最后注销注册表
    pub async fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.clear_tasks().await;
        }
        if let Err(e) = self.bus.close().await {
            warn!("关闭消息总线失败: {}", e);
        }
        self.registry.shutdown().await;
        info!("应用程序已停止");
    }

    /// 启动后一直运行到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.start().await?;

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号");

        self.stop().await;
        Ok(())
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn mediator(&self) -> &Arc<InProcessMediator> {
        &self.mediator
    }

    /// 仅生产者拥有调度器
    pub fn scheduler(&self) -> Option<&Arc<ServiceScheduler>> {
        self.scheduler.as_ref()
    }
}

/// 消费者的默认任务处理器，只记录日志
pub struct LoggingTaskHandler;

#[async_trait]
impl TaskRequestHandler for LoggingTaskHandler {
    async fn handle(&self, request: TaskReceived) -> KeeperResult<EventResult> {
        info!(
            task_id = %request.task_id,
            "处理任务 {}: {}",
            request.name,
            request.payload
        );
        Ok(EventResult::success())
    }
}

/// 从 JSON 文件加载根任务列表
pub fn load_tasks_file(path: impl AsRef<Path>) -> Result<Vec<TaskEntity>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取任务文件失败: {}", path.display()))?;
    let tasks: Vec<TaskEntity> = serde_json::from_str(&content)
        .with_context(|| format!("解析任务文件失败: {}", path.display()))?;
    info!("从 {} 加载了 {} 个任务", path.display(), tasks.len());
    Ok(tasks)
}

/// 创建共享键值存储
async fn create_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>> {
    if !config.redis.enabled {
        warn!("Redis 未启用，使用进程内存储，注册表只在本进程内可见");
        return Ok(Arc::new(InMemoryKeyValueStore::new()));
    }

    info!(
        "连接Redis: {}:{}/{}",
        config.redis.host, config.redis.port, config.redis.database
    );
    let store = RedisKeyValueStore::new(&config.redis)
        .await
        .context("连接Redis失败")?;
    Ok(Arc::new(store))
}

/// 创建消息总线
async fn create_message_bus(config: &AppConfig) -> Result<Arc<dyn MessageBus>> {
    match config.message_queue.r#type {
        MessageQueueType::InMemory => {
            warn!("使用进程内消息总线");
            Ok(Arc::new(InMemoryEventBus::new()))
        }
        MessageQueueType::Rabbitmq => {
            info!("连接消息队列: {}", mask_amqp_url(&config.message_queue.url));
            let bus: Arc<dyn MessageBus> = RabbitMqEventBus::new(&config.message_queue)
                .await
                .context("连接消息队列失败")?;
            Ok(bus)
        }
    }
}

fn local_hostname() -> Result<String> {
    hostname::get()
        .context("获取主机名失败")?
        .into_string()
        .map_err(|_| anyhow::anyhow!("主机名不是有效的UTF-8"))
}

/// 屏蔽AMQP URL中的敏感信息
fn mask_amqp_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
