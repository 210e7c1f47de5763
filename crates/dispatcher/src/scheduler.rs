use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use keeper_core::{
    emit_log,
    models::{Notification, OutcomeCode, ReplyEnvelope, TaskEntity, TriggerKind},
    KeeperError, KeeperResult, LogLevel, Mediator, MessageBus, ServiceDirectory,
};
use keeper_infrastructure::MetricsCollector;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::counters::TaskCounters;
use crate::task_graph;

/// 指定时间触发器的去重粒度
const FIRED_MINUTE_FORMAT: &str = "%m-%d %H:%M";

/// 一次分派最终到达节点的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 已发布给处于 Active 状态的目标服务
    Published,
    /// 目标服务不存在或不处于 Active 状态
    NotFound,
    /// 发布失败
    Failed,
}

/// 服务调度器
///
/// 任务表、定时器表、去重表各自持有独立的锁，互不阻塞。
pub struct ServiceScheduler {
    directory: Arc<dyn ServiceDirectory>,
    bus: Arc<dyn MessageBus>,
    mediator: Arc<dyn Mediator>,
    counters: TaskCounters,
    specific_time_poll: Duration,
    roots: RwLock<HashMap<Uuid, TaskEntity>>,
    nodes: RwLock<HashMap<Uuid, TaskEntity>>,
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    last_fired: Mutex<HashMap<Uuid, String>>,
}

impl ServiceScheduler {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        bus: Arc<dyn MessageBus>,
        mediator: Arc<dyn Mediator>,
        specific_time_poll: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            directory,
            bus,
            mediator,
            counters: TaskCounters::new(MetricsCollector::new()),
            specific_time_poll,
            roots: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            last_fired: Mutex::new(HashMap::new()),
        })
    }

    /// 注册根任务
    ///
    /// 触发器缺失或配置不完整时拒绝注册。同一 id 已注册时先移除旧任务再注册。
    pub async fn add_task(self: &Arc<Self>, root: TaskEntity) -> KeeperResult<()> {
        if let Err(e) = Self::validate_root(&root) {
            emit_log(
                self.mediator.as_ref(),
                LogLevel::Error,
                format!("拒绝注册任务 {}: {}", root.name, e),
            );
            return Err(e);
        }

        // 定时器表的锁贯穿整个替换过程，同一 id 的并发注册只会留下一个定时器
        let mut timers = self.timers.lock().await;
        let replaced = self.detach_root(&mut timers, root.id).await;
        if replaced {
            debug!("任务 {} 已存在，替换旧任务", root.id);
        }

        {
            let mut nodes = self.nodes.write().await;
            for node in task_graph::collect_nodes(&root) {
                nodes.insert(node.id, node.clone());
            }
        }

        let (id, name) = (root.id, root.name.clone());
        let timer = self.spawn_timer(root.clone());
        self.roots.write().await.insert(id, root);
        if let Some(previous) = timers.insert(id, timer) {
            previous.abort();
        }
        drop(timers);
        if !replaced {
            self.counters.task_registered();
        }

        info!("任务已注册: {} ({})", name, id);
        self.mediator.publish(Notification::TaskAdded { id, name });
        Ok(())
    }

    fn validate_root(root: &TaskEntity) -> KeeperResult<()> {
        let trigger = root.trigger.as_ref().ok_or_else(|| {
            KeeperError::Configuration(format!("根任务 {} 缺少触发器", root.id))
        })?;
        trigger.validate()?;
        task_graph::check_cycles(root)
    }

    /// 删除根任务及其所有后继节点，返回是否确实删除了任务
    pub async fn delete_task(&self, id: Uuid) -> bool {
        let removed = {
            let mut timers = self.timers.lock().await;
            self.detach_root(&mut timers, id).await
        };
        if removed {
            self.counters.task_unregistered();
            info!("任务已删除: {}", id);
            self.mediator.publish(Notification::TaskDeleted { id });
        }
        removed
    }

    /// 停止根任务的定时器并移除其节点，调用方需持有定时器表的锁
    async fn detach_root(&self, timers: &mut HashMap<Uuid, JoinHandle<()>>, id: Uuid) -> bool {
        let Some(timer) = timers.remove(&id) else {
            return false;
        };
        timer.abort();

        if let Some(root) = self.roots.write().await.remove(&id) {
            let mut nodes = self.nodes.write().await;
            for node_id in task_graph::reachable_ids(&root) {
                nodes.remove(&node_id);
            }
        }
        self.last_fired.lock().await.remove(&id);
        true
    }

    /// 停止所有定时器并清空所有任务
    pub async fn clear_tasks(&self) {
        let mut timers = self.timers.lock().await;
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.abort();
        }
        self.roots.write().await.clear();
        self.nodes.write().await.clear();
        self.last_fired.lock().await.clear();
        self.counters.reset_registered();
        drop(timers);
        info!("已清空 {} 个任务", count);
    }

    fn spawn_timer(self: &Arc<Self>, root: TaskEntity) -> JoinHandle<()> {
        let period = match root.trigger.as_ref().map(|t| (t.kind, t.time_interval.as_ref())) {
            Some((TriggerKind::TimeInterval, Some(interval))) => {
                Duration::from_secs(interval.interval_seconds)
            }
            _ => self.specific_time_poll,
        };
        let scheduler: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.fire_root_at(&root, Local::now().naive_local()).await;
            }
        })
    }

    /// 根节点的一次定时触发
    ///
    /// 触发器判断不通过时返回 `None`。指定时间触发器在同一分钟内只触发一次。
    pub async fn fire_root_at(
        &self,
        root: &TaskEntity,
        now: NaiveDateTime,
    ) -> Option<DispatchOutcome> {
        let trigger = root.trigger.as_ref()?;
        if !trigger.should_trigger(now) {
            return None;
        }

        if trigger.kind == TriggerKind::SpecificTime {
            let minute = now.format(FIRED_MINUTE_FORMAT).to_string();
            let mut last_fired = self.last_fired.lock().await;
            if last_fired.get(&root.id) == Some(&minute) {
                return None;
            }
            last_fired.insert(root.id, minute);
        }

        Some(self.publish_task_now(root).await)
    }

    /// 立即分派节点，不检查触发器
    ///
    /// 目标不存在时沿 `on_not_found` 继续，发布失败时沿 `on_failure` 继续，
    /// 返回最后到达节点的结果。
    pub async fn publish_task_now(&self, node: &TaskEntity) -> DispatchOutcome {
        let mut node = node;
        loop {
            self.counters.record_executed();

            let next = match self.directory.find_active(&node.publish_key).await {
                Some(target) => match self.bus.publish(target.name(), &node.to_detail()).await {
                    Ok(()) => {
                        debug!("任务 {} 已发布到 {}", node.name, target.name());
                        return DispatchOutcome::Published;
                    }
                    Err(e) => {
                        self.counters.record_failed();
                        emit_log(
                            self.mediator.as_ref(),
                            LogLevel::Error,
                            format!("发布任务 {} 到 {} 失败: {}", node.name, node.publish_key, e),
                        );
                        match node.on_failure.as_deref() {
                            Some(next) => next,
                            None => return DispatchOutcome::Failed,
                        }
                    }
                },
                None => {
                    self.counters.record_not_found();
                    match node.on_not_found.as_deref() {
                        Some(next) => {
                            debug!("{} 不可用，分派 on_not_found 节点 {}", node.publish_key, next.name);
                            next
                        }
                        None => {
                            emit_log(
                                self.mediator.as_ref(),
                                LogLevel::Warning,
                                format!("任务 {} 的目标服务 {} 不可用", node.name, node.publish_key),
                            );
                            return DispatchOutcome::NotFound;
                        }
                    }
                }
            };
            node = next;
        }
    }

    /// 按 id 分派已注册的节点
    pub async fn publish_task_now_by_id(&self, id: Uuid) -> DispatchOutcome {
        let node = self.nodes.read().await.get(&id).cloned();
        match node {
            Some(node) => self.publish_task_now(&node).await,
            None => {
                self.counters.record_executed();
                self.counters.record_not_found();
                emit_log(
                    self.mediator.as_ref(),
                    LogLevel::Warning,
                    format!("任务节点 {id} 不存在"),
                );
                DispatchOutcome::NotFound
            }
        }
    }

    /// 处理消费端的回复
    ///
    /// 按结果代码计数，节点存在对应分支时分派该分支，返回分派结果。
    pub async fn handle_reply(&self, envelope: &ReplyEnvelope) -> Option<DispatchOutcome> {
        let outcome = envelope.outcome_code;
        match outcome {
            OutcomeCode::Success => self.counters.record_succeeded(),
            OutcomeCode::Failure | OutcomeCode::ParseError => self.counters.record_failed(),
            OutcomeCode::NotFound => self.counters.record_not_found(),
        }

        let Some(node_id) = envelope.node_id else {
            self.report_terminal(&envelope.destination_task_name, envelope);
            return None;
        };

        let node = self.nodes.read().await.get(&node_id).cloned();
        let Some(node) = node else {
            self.counters.record_not_found();
            emit_log(
                self.mediator.as_ref(),
                LogLevel::Warning,
                format!(
                    "回复引用的任务节点 {} ({}) 不存在",
                    node_id, envelope.destination_task_name
                ),
            );
            return None;
        };

        match node.branch(outcome) {
            Some(next) => Some(self.publish_task_now(next).await),
            None => {
                self.report_terminal(&node.name, envelope);
                None
            }
        }
    }

    /// 没有后继分支的回复：成功只记录，失败类结果发出 Warning 日志通知
    fn report_terminal(&self, name: &str, envelope: &ReplyEnvelope) {
        let outcome = envelope.outcome_code;
        if outcome.is_success() {
            info!("任务 {} 执行成功", name);
        } else {
            emit_log(
                self.mediator.as_ref(),
                LogLevel::Warning,
                format!(
                    "任务 {} 结束: {} {}",
                    name,
                    outcome,
                    envelope.message.as_deref().unwrap_or_default()
                ),
            );
        }
    }

    pub fn counters(&self) -> &TaskCounters {
        &self.counters
    }

    /// 已注册的根任务数
    pub async fn task_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub async fn contains_node(&self, id: Uuid) -> bool {
        self.nodes.read().await.contains_key(&id)
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }
}

impl Drop for ServiceScheduler {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().values() {
            timer.abort();
        }
    }
}
