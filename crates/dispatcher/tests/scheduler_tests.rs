use std::sync::Arc;
use std::time::Duration;

use keeper_core::{
    models::{
        DailyRule, Notification, OutcomeCode, ReplyEnvelope, ServiceRole, SpecificTime,
        TaskEntity, TaskTrigger, TimeInterval, TriggerKind,
    },
    IntegrationEventHandler, KeeperError, LogLevel,
};
use keeper_dispatcher::{DispatchOutcome, ReplyHandler, ServiceScheduler};
use keeper_testing_utils::{
    local_time, AdvertisementBuilder, MockMessageBus, MockServiceDirectory, RecordingMediator,
    TaskEntityBuilder,
};
use uuid::Uuid;

struct Fixture {
    scheduler: Arc<ServiceScheduler>,
    directory: MockServiceDirectory,
    bus: MockMessageBus,
    mediator: RecordingMediator,
}

fn fixture() -> Fixture {
    let directory = MockServiceDirectory::new();
    let bus = MockMessageBus::new();
    let mediator = RecordingMediator::new();
    let scheduler = ServiceScheduler::new(
        Arc::new(directory.clone()),
        Arc::new(bus.clone()),
        Arc::new(mediator.clone()),
        Duration::from_secs(30),
    );
    Fixture {
        scheduler,
        directory,
        bus,
        mediator,
    }
}

fn active(name: &str) -> keeper_core::models::ServiceAdvertisement {
    AdvertisementBuilder::new(name)
        .with_host(&format!("{name}-host"))
        .with_role(ServiceRole::Consumer)
        .active()
        .build()
}

fn leaf(name: &str, publish_key: &str) -> TaskEntity {
    TaskEntityBuilder::new()
        .with_name(name)
        .with_publish_key(publish_key)
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_add_task_twice_keeps_one_timer() {
    let f = fixture();
    let root = TaskEntityBuilder::new()
        .with_interval(60)
        .on_success(leaf("next", "billing"))
        .build();

    f.scheduler.add_task(root.clone()).await.unwrap();
    f.scheduler.add_task(root.clone()).await.unwrap();

    assert_eq!(f.scheduler.task_count().await, 1);
    assert_eq!(f.scheduler.node_count().await, 2);
    assert_eq!(f.scheduler.counters().registered(), 1);
    assert_eq!(
        f.mediator
            .count(|n| matches!(n, Notification::TaskAdded { id, .. } if *id == root.id)),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_of_same_task_keeps_one_timer() {
    let f = fixture();
    f.directory.add(active("billing"));
    let root = TaskEntityBuilder::new()
        .with_publish_key("billing")
        .with_interval(1)
        .build();

    let barrier = Arc::new(tokio::sync::Barrier::new(4));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let scheduler = f.scheduler.clone();
        let barrier = barrier.clone();
        let root = root.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            scheduler.add_task(root).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(f.scheduler.task_count().await, 1);
    assert_eq!(f.scheduler.counters().registered(), 1);
    assert_eq!(f.bus.published_to("billing").len(), 1);

    assert!(f.scheduler.delete_task(root.id).await);
    assert_eq!(f.scheduler.counters().registered(), 0);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(f.bus.published_to("billing").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_task_publishes_once_per_tick() {
    let f = fixture();
    f.directory.add(active("billing"));
    let root = TaskEntityBuilder::new()
        .with_name("invoice")
        .with_publish_key("billing")
        .with_payload("{\"month\":1}")
        .with_interval(5)
        .build();

    f.scheduler.add_task(root.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert!(f.bus.published_to("billing").is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.bus.published_to("billing").len(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let published = f.bus.published_to("billing");
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], root.to_detail());
    assert_eq!(f.scheduler.counters().totals().executed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_destination_dispatches_not_found_branch() {
    let f = fixture();
    f.directory.add(active("fallback"));
    let fallback = leaf("alert", "fallback");
    let root = TaskEntityBuilder::new()
        .with_publish_key("billing")
        .with_interval(5)
        .on_not_found(fallback.clone())
        .build();

    f.scheduler.add_task(root).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5100)).await;

    assert!(f.bus.published_to("billing").is_empty());
    assert_eq!(f.bus.published_to("fallback"), vec![fallback.to_detail()]);

    let totals = f.scheduler.counters().totals();
    assert_eq!(totals.not_found, 1);
    assert_eq!(totals.executed, 2);
}

#[tokio::test]
async fn test_missing_destination_without_branch_is_logged() {
    let f = fixture();
    let node = leaf("orphan", "nowhere");

    assert_eq!(
        f.scheduler.publish_task_now(&node).await,
        DispatchOutcome::NotFound
    );
    assert_eq!(f.scheduler.counters().totals().not_found, 1);
    assert_eq!(
        f.mediator
            .count(|n| matches!(n, Notification::Log { message, .. } if message.contains("nowhere"))),
        1
    );
}

#[tokio::test]
async fn test_standby_destination_counts_as_not_found() {
    let f = fixture();
    f.directory.add(AdvertisementBuilder::new("billing").build());

    let outcome = f.scheduler.publish_task_now(&leaf("invoice", "billing")).await;

    assert_eq!(outcome, DispatchOutcome::NotFound);
    assert!(f.bus.published().is_empty());
}

#[tokio::test]
async fn test_publish_error_dispatches_failure_branch() {
    let f = fixture();
    f.directory.add(active("billing"));
    f.bus.set_fail_publish(true);
    let node = TaskEntityBuilder::new()
        .with_publish_key("billing")
        .on_failure(leaf("cleanup", "billing"))
        .build();

    let outcome = f.scheduler.publish_task_now(&node).await;

    assert_eq!(outcome, DispatchOutcome::Failed);
    let totals = f.scheduler.counters().totals();
    assert_eq!(totals.executed, 2);
    assert_eq!(totals.failed, 2);
}

#[tokio::test]
async fn test_failure_reply_dispatches_failure_branch_once() {
    let f = fixture();
    f.directory.add(active("billing"));
    f.directory.add(active("recovery"));
    let recover = leaf("recover", "recovery");
    let root = TaskEntityBuilder::new()
        .with_publish_key("billing")
        .with_interval(3600)
        .on_success(leaf("report", "billing"))
        .on_failure(recover.clone())
        .build();
    f.scheduler.add_task(root.clone()).await.unwrap();

    let envelope = ReplyEnvelope::new(&root.name, OutcomeCode::Failure)
        .with_node_id(root.id)
        .with_message("boom");
    let outcome = f.scheduler.handle_reply(&envelope).await;

    assert_eq!(outcome, Some(DispatchOutcome::Published));
    assert_eq!(f.bus.published_to("recovery"), vec![recover.to_detail()]);
    assert!(f.bus.published_to("billing").is_empty());
    assert_eq!(f.scheduler.counters().totals().failed, 1);
    assert_eq!(f.scheduler.counters().time_range().failed, 1);
}

#[tokio::test]
async fn test_parse_error_reply_follows_failure_branch() {
    let f = fixture();
    f.directory.add(active("recovery"));
    let root = TaskEntityBuilder::new()
        .with_interval(3600)
        .on_failure(leaf("recover", "recovery"))
        .build();
    f.scheduler.add_task(root.clone()).await.unwrap();

    let envelope = ReplyEnvelope::new(&root.name, OutcomeCode::ParseError).with_node_id(root.id);
    f.scheduler.handle_reply(&envelope).await;

    assert_eq!(f.bus.published_to("recovery").len(), 1);
    assert_eq!(f.scheduler.counters().totals().failed, 1);
}

#[tokio::test]
async fn test_terminal_failure_replies_are_reported() {
    let f = fixture();
    let root = TaskEntityBuilder::new().with_interval(3600).build();
    f.scheduler.add_task(root.clone()).await.unwrap();
    let warnings = |m: &RecordingMediator| {
        m.count(|n| matches!(n, Notification::Log { level, .. } if *level == LogLevel::Warning))
    };

    let failure = ReplyEnvelope::new(&root.name, OutcomeCode::Failure)
        .with_node_id(root.id)
        .with_message("disk full");
    assert_eq!(f.scheduler.handle_reply(&failure).await, None);
    assert_eq!(warnings(&f.mediator), 1);

    let unparsed = ReplyEnvelope::new("billing", OutcomeCode::ParseError);
    assert_eq!(f.scheduler.handle_reply(&unparsed).await, None);
    assert_eq!(warnings(&f.mediator), 2);

    let success = ReplyEnvelope::new(&root.name, OutcomeCode::Success).with_node_id(root.id);
    f.scheduler.handle_reply(&success).await;
    assert_eq!(warnings(&f.mediator), 2);
    assert!(f.bus.published().is_empty());
}

#[tokio::test]
async fn test_success_reply_on_leaf_is_terminal() {
    let f = fixture();
    let root = TaskEntityBuilder::new().with_interval(3600).build();
    f.scheduler.add_task(root.clone()).await.unwrap();

    let envelope = ReplyEnvelope::new(&root.name, OutcomeCode::Success).with_node_id(root.id);

    assert_eq!(f.scheduler.handle_reply(&envelope).await, None);
    assert_eq!(f.scheduler.counters().totals().succeeded, 1);
    assert!(f.bus.published().is_empty());
}

#[tokio::test]
async fn test_deleted_task_replies_are_not_found() {
    let f = fixture();
    f.directory.add(active("billing"));
    let grandchild = leaf("archive", "billing");
    let child = TaskEntityBuilder::new()
        .with_name("report")
        .with_publish_key("billing")
        .on_success(grandchild.clone())
        .build();
    let root = TaskEntityBuilder::new()
        .with_interval(3600)
        .on_success(child.clone())
        .build();
    f.scheduler.add_task(root.clone()).await.unwrap();
    assert!(f.scheduler.contains_node(grandchild.id).await);

    assert!(f.scheduler.delete_task(root.id).await);
    assert!(!f.scheduler.delete_task(root.id).await);

    for id in [root.id, child.id, grandchild.id] {
        assert!(!f.scheduler.contains_node(id).await);
    }
    assert_eq!(f.scheduler.counters().registered(), 0);
    assert_eq!(
        f.mediator
            .count(|n| matches!(n, Notification::TaskDeleted { id } if *id == root.id)),
        1
    );

    let envelope = ReplyEnvelope::new("report", OutcomeCode::Success).with_node_id(child.id);
    assert_eq!(f.scheduler.handle_reply(&envelope).await, None);
    assert!(f.bus.published().is_empty());
    assert_eq!(f.scheduler.counters().totals().not_found, 1);
}

#[tokio::test]
async fn test_publish_by_unknown_id_is_not_fatal() {
    let f = fixture();

    let outcome = f.scheduler.publish_task_now_by_id(Uuid::new_v4()).await;

    assert_eq!(outcome, DispatchOutcome::NotFound);
    let totals = f.scheduler.counters().totals();
    assert_eq!(totals.executed, 1);
    assert_eq!(totals.not_found, 1);
}

#[tokio::test]
async fn test_publish_by_id_reaches_registered_child() {
    let f = fixture();
    f.directory.add(active("billing"));
    let child = leaf("report", "billing");
    let root = TaskEntityBuilder::new()
        .with_interval(3600)
        .on_success(child.clone())
        .build();
    f.scheduler.add_task(root).await.unwrap();

    let outcome = f.scheduler.publish_task_now_by_id(child.id).await;

    assert_eq!(outcome, DispatchOutcome::Published);
    assert_eq!(f.bus.published_to("billing"), vec![child.to_detail()]);
}

#[tokio::test]
async fn test_malformed_triggers_are_rejected() {
    let f = fixture();

    let no_trigger = TaskEntityBuilder::new().build();
    assert!(matches!(
        f.scheduler.add_task(no_trigger).await,
        Err(KeeperError::Configuration(_))
    ));

    let mismatched = TaskEntityBuilder::new()
        .with_trigger(TaskTrigger {
            kind: TriggerKind::TimeInterval,
            time_interval: None,
            specific_time: Some(SpecificTime::default()),
        })
        .build();
    assert!(f.scheduler.add_task(mismatched).await.is_err());

    let missing_specific = TaskEntityBuilder::new()
        .with_trigger(TaskTrigger {
            kind: TriggerKind::SpecificTime,
            time_interval: Some(TimeInterval::new(5)),
            specific_time: None,
        })
        .build();
    assert!(f.scheduler.add_task(missing_specific).await.is_err());

    assert_eq!(f.scheduler.task_count().await, 0);
    assert_eq!(f.scheduler.node_count().await, 0);
}

#[tokio::test]
async fn test_repeated_id_on_branch_is_rejected() {
    let f = fixture();
    let root = TaskEntityBuilder::new().with_interval(60).build();
    let looped = TaskEntityBuilder::new().with_id(root.id).build();
    let root = TaskEntity {
        on_failure: Some(Box::new(looped)),
        ..root
    };

    let result = f.scheduler.add_task(root).await;

    assert!(matches!(result, Err(KeeperError::CircularDependency { .. })));
    assert_eq!(f.scheduler.task_count().await, 0);
}

#[tokio::test]
async fn test_specific_time_fires_once_per_matching_minute() {
    let f = fixture();
    f.directory.add(active("billing"));
    let root = TaskEntityBuilder::new()
        .with_publish_key("billing")
        .with_specific_time(SpecificTime {
            daily: Some(DailyRule {
                day_of_week: vec![],
                times: vec!["09:00".to_string(), "09:01".to_string()],
            }),
            ..Default::default()
        })
        .build();

    let at = |minute, second| {
        local_time(2024, 3, 4, 9, minute)
            .checked_add_signed(chrono::Duration::seconds(second))
            .unwrap()
    };

    assert_eq!(
        f.scheduler.fire_root_at(&root, at(0, 0)).await,
        Some(DispatchOutcome::Published)
    );
    assert_eq!(f.scheduler.fire_root_at(&root, at(0, 30)).await, None);
    assert_eq!(
        f.scheduler.fire_root_at(&root, at(1, 0)).await,
        Some(DispatchOutcome::Published)
    );
    assert_eq!(f.scheduler.fire_root_at(&root, at(2, 0)).await, None);

    assert_eq!(f.bus.published_to("billing").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_tasks_stops_all_timers() {
    let f = fixture();
    f.directory.add(active("billing"));
    for _ in 0..3 {
        let root = TaskEntityBuilder::new()
            .with_publish_key("billing")
            .with_interval(5)
            .build();
        f.scheduler.add_task(root).await.unwrap();
    }
    assert_eq!(f.scheduler.counters().registered(), 3);

    f.scheduler.clear_tasks().await;
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(f.scheduler.task_count().await, 0);
    assert_eq!(f.scheduler.counters().registered(), 0);
    assert!(f.bus.published().is_empty());
}

#[tokio::test]
async fn test_reply_handler_forwards_envelopes() {
    let f = fixture();
    f.directory.add(active("recovery"));
    let root = TaskEntityBuilder::new()
        .with_interval(3600)
        .on_failure(leaf("recover", "recovery"))
        .build();
    f.scheduler.add_task(root.clone()).await.unwrap();

    let handler = ReplyHandler::new(f.scheduler.clone());
    let body = serde_json::to_vec(
        &ReplyEnvelope::new(&root.name, OutcomeCode::Failure).with_node_id(root.id),
    )
    .unwrap();

    handler.handle("producer", &body).await.unwrap();
    assert_eq!(f.bus.published_to("recovery").len(), 1);

    let garbage = handler.handle("producer", b"not json").await;
    assert!(matches!(garbage, Err(KeeperError::Serialization(_))));
}
