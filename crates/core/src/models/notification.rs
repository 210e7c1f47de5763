use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logging::LogLevel;

/// 进程内广播的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// 结构化日志事件
    Log { level: LogLevel, message: String },
    /// 调度器新增了任务
    TaskAdded { id: Uuid, name: String },
    /// 调度器删除了任务
    TaskDeleted { id: Uuid },
    /// 注册表快照发生变化
    RegistryChanged,
}

impl Notification {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Notification::Log {
            level,
            message: message.into(),
        }
    }
}

/// 交给应用代码处理的任务请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReceived {
    pub task_id: Uuid,
    pub name: String,
    pub payload: String,
}
