use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::{
    config::{AppConfig, MessageQueueType},
    models::{
        EventResult, ServiceRole, TaskEntity, TaskReceived, TaskTrigger, TimeInterval,
        REGISTRY_KEY_PREFIX,
    },
    KeeperResult, KeyValueStore, TaskRequestHandler,
};
use keeper_dispatcher::DispatchOutcome;
use keeper_infrastructure::{InMemoryEventBus, InMemoryKeyValueStore};
use service_keeper::app::Application;

/// 记录收到的任务，名称在 `failing` 中的任务返回失败
#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
    failing: Vec<String>,
}

#[async_trait]
impl TaskRequestHandler for RecordingHandler {
    async fn handle(&self, request: TaskReceived) -> KeeperResult<EventResult> {
        self.seen.lock().unwrap().push(request.name.clone());
        if self.failing.contains(&request.name) {
            Ok(EventResult::failure("rejected by test"))
        } else {
            Ok(EventResult::success())
        }
    }
}

fn config(name: &str, role: ServiceRole) -> AppConfig {
    let mut config = AppConfig::default();
    config.service.name = name.to_string();
    config.service.role = role;
    config.service.lease_seconds = 4;
    config.service.heartbeat_seconds = 1;
    config.redis.enabled = false;
    config.message_queue.r#type = MessageQueueType::InMemory;
    config
}

struct Cluster {
    store: Arc<InMemoryKeyValueStore>,
    bus: Arc<InMemoryEventBus>,
    handler: Arc<RecordingHandler>,
    producer: Application,
    consumer: Application,
}

async fn cluster(handler: RecordingHandler) -> Cluster {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let handler = Arc::new(handler);

    let consumer = Application::with_backends(
        config("billing", ServiceRole::Consumer),
        ServiceRole::Consumer,
        "worker-1".to_string(),
        store.clone(),
        bus.clone(),
        Some(handler.clone() as Arc<dyn TaskRequestHandler>),
    )
    .await
    .unwrap();
    consumer.start().await.unwrap();

    let producer = Application::with_backends(
        config("scheduler", ServiceRole::Producer),
        ServiceRole::Producer,
        "producer-1".to_string(),
        store.clone(),
        bus.clone(),
        None,
    )
    .await
    .unwrap();
    producer.start().await.unwrap();

    // 消费者启动时生产者还不存在
    consumer.registry().refresh_snapshot().await;

    Cluster {
        store,
        bus,
        handler,
        producer,
        consumer,
    }
}

fn hourly(name: &str, publish_key: &str) -> TaskEntity {
    TaskEntity::new(name, publish_key, "{}").with_trigger(TaskTrigger::interval(TimeInterval::new(3600)))
}

#[tokio::test]
async fn test_success_branch_runs_on_consumer() {
    let cluster = cluster(RecordingHandler::default()).await;
    let scheduler = cluster.producer.scheduler().unwrap();

    let root = hourly("invoice", "billing").on_success(TaskEntity::new("archive", "billing", "{}"));
    scheduler.add_task(root.clone()).await.unwrap();

    assert_eq!(
        scheduler.publish_task_now(&root).await,
        DispatchOutcome::Published
    );

    // 两个任务、两个回复
    assert!(cluster.bus.wait_for_deliveries(4, Duration::from_secs(5)).await);
    assert_eq!(
        *cluster.handler.seen.lock().unwrap(),
        vec!["invoice".to_string(), "archive".to_string()]
    );
    assert_eq!(scheduler.counters().totals().succeeded, 2);

    cluster.producer.stop().await;
    cluster.consumer.stop().await;
}

#[tokio::test]
async fn test_failure_reply_routes_to_failure_branch() {
    let handler = RecordingHandler {
        failing: vec!["invoice".to_string()],
        ..Default::default()
    };
    let cluster = cluster(handler).await;
    let scheduler = cluster.producer.scheduler().unwrap();

    let root = hourly("invoice", "billing")
        .on_success(TaskEntity::new("archive", "billing", "{}"))
        .on_failure(TaskEntity::new("refund", "billing", "{}"));
    scheduler.add_task(root.clone()).await.unwrap();
    scheduler.publish_task_now(&root).await;

    assert!(cluster.bus.wait_for_deliveries(4, Duration::from_secs(5)).await);
    assert_eq!(
        *cluster.handler.seen.lock().unwrap(),
        vec!["invoice".to_string(), "refund".to_string()]
    );
    let totals = scheduler.counters().totals();
    assert_eq!(totals.failed, 1);
    assert_eq!(totals.succeeded, 1);

    cluster.producer.stop().await;
    cluster.consumer.stop().await;
}

#[tokio::test]
async fn test_unknown_destination_is_not_published() {
    let cluster = cluster(RecordingHandler::default()).await;
    let scheduler = cluster.producer.scheduler().unwrap();

    let outcome = scheduler
        .publish_task_now(&TaskEntity::new("orphan", "shipping", "{}"))
        .await;

    assert_eq!(outcome, DispatchOutcome::NotFound);
    assert_eq!(cluster.bus.stats().delivered(), 0);

    cluster.producer.stop().await;
    cluster.consumer.stop().await;
}

#[tokio::test]
async fn test_stop_withdraws_both_advertisements() {
    let cluster = cluster(RecordingHandler::default()).await;
    assert!(cluster.producer.registry().is_active().await);
    assert!(cluster.consumer.registry().is_active().await);
    assert_eq!(
        cluster.store.list_keys(REGISTRY_KEY_PREFIX).await.unwrap().len(),
        2
    );

    cluster.producer.stop().await;
    cluster.consumer.stop().await;

    assert!(cluster
        .store
        .list_keys(REGISTRY_KEY_PREFIX)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_producer_loads_tasks_file_on_start() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let tasks = vec![hourly("invoice", "billing"), hourly("report", "reports")];
    std::fs::write(file.path(), serde_json::to_string(&tasks).unwrap()).unwrap();

    let mut config = config("scheduler", ServiceRole::Producer);
    config.scheduler.tasks_file = Some(file.path().to_string_lossy().into_owned());

    let producer = Application::with_backends(
        config,
        ServiceRole::Producer,
        "producer-1".to_string(),
        Arc::new(InMemoryKeyValueStore::new()),
        Arc::new(InMemoryEventBus::new()),
        None,
    )
    .await
    .unwrap();
    producer.start().await.unwrap();

    let scheduler = producer.scheduler().unwrap();
    assert_eq!(scheduler.task_count().await, 2);

    producer.stop().await;
    assert_eq!(scheduler.task_count().await, 0);
}
