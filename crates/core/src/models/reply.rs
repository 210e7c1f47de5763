use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 远程执行结果代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeCode {
    /// 执行成功
    Success,
    /// 执行了但失败
    Failure,
    /// 目标服务未找到
    NotFound,
    /// 消息体无法解析
    ParseError,
}

impl OutcomeCode {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeCode::Success)
    }
}

impl std::fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutcomeCode::Success => "Success",
            OutcomeCode::Failure => "Failure",
            OutcomeCode::NotFound => "NotFound",
            OutcomeCode::ParseError => "ParseError",
        };
        write!(f, "{s}")
    }
}

/// 回复信封
///
/// 由消费端生成，经消息总线发送回生产端，用于把远程结果关联回任务图节点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub destination_task_name: String,
    #[serde(default)]
    pub node_id: Option<Uuid>,
    pub outcome_code: OutcomeCode,
    #[serde(default)]
    pub message: Option<String>,
}

impl ReplyEnvelope {
    pub fn new(destination_task_name: impl Into<String>, outcome_code: OutcomeCode) -> Self {
        Self {
            destination_task_name: destination_task_name.into(),
            node_id: None,
            outcome_code,
            message: None,
        }
    }

    pub fn with_node_id(mut self, node_id: Uuid) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// 应用代码处理任务后返回的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    pub code: OutcomeCode,
    pub message: Option<String>,
}

impl EventResult {
    pub fn success() -> Self {
        Self {
            code: OutcomeCode::Success,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: OutcomeCode::Failure,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
