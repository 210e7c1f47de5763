use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{reply::OutcomeCode, trigger::TaskTrigger};

/// 任务图节点
///
/// 只有根节点携带触发器；`on_success`、`on_failure`、`on_not_found`
/// 三条边分别指向按结果分派的后继节点。边以拥有所有权的子节点表示，
/// 因此结构上无法构造出环。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntity {
    pub id: Uuid,
    pub name: String,
    /// 目标服务的逻辑名称，同时作为发布的路由键
    pub publish_key: String,
    /// 任务负载，对调度核心不透明
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TaskTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<TaskEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Box<TaskEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_not_found: Option<Box<TaskEntity>>,
}

impl TaskEntity {
    pub fn new(
        name: impl Into<String>,
        publish_key: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            publish_key: publish_key.into(),
            payload: payload.into(),
            trigger: None,
            on_success: None,
            on_failure: None,
            on_not_found: None,
        }
    }

    pub fn with_trigger(mut self, trigger: TaskTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn on_success(mut self, node: TaskEntity) -> Self {
        self.on_success = Some(Box::new(node));
        self
    }

    pub fn on_failure(mut self, node: TaskEntity) -> Self {
        self.on_failure = Some(Box::new(node));
        self
    }

    pub fn on_not_found(mut self, node: TaskEntity) -> Self {
        self.on_not_found = Some(Box::new(node));
        self
    }

    /// 根据执行结果选择后继节点
    ///
    /// `ParseError` 与 `Failure` 一样走失败分支。
    pub fn branch(&self, outcome: OutcomeCode) -> Option<&TaskEntity> {
        match outcome {
            OutcomeCode::Success => self.on_success.as_deref(),
            OutcomeCode::Failure | OutcomeCode::ParseError => self.on_failure.as_deref(),
            OutcomeCode::NotFound => self.on_not_found.as_deref(),
        }
    }

    /// 直接后继节点
    pub fn children(&self) -> impl Iterator<Item = &TaskEntity> {
        [&self.on_success, &self.on_failure, &self.on_not_found]
            .into_iter()
            .filter_map(|edge| edge.as_deref())
    }

    /// 生成发送给消费端的任务详情
    pub fn to_detail(&self) -> TaskDetail {
        TaskDetail {
            id: self.id,
            name: self.name.clone(),
            task: self.payload.clone(),
        }
    }
}

/// 经消息总线发布的任务详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub id: Uuid,
    pub name: String,
    pub task: String,
}
