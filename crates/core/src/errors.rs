use thiserror::Error;

/// 服务协调错误类型定义
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("检测到循环依赖: 任务 {id} 出现在自身的后继节点中")]
    CircularDependency { id: uuid::Uuid },

    #[error("服务已注册: {key}")]
    DuplicateRegistration { key: String },

    #[error("处理器错误: {0}")]
    Handler(String),
}

impl KeeperError {
    /// 是否为配置类错误（调用方输入错误，而非运行时故障）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KeeperError::Configuration(_)
                | KeeperError::CircularDependency { .. }
                | KeeperError::DuplicateRegistration { .. }
        )
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type KeeperResult<T> = std::result::Result<T, KeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(KeeperError::Configuration("x".into()).is_configuration());
        assert!(KeeperError::CircularDependency { id: uuid::Uuid::new_v4() }.is_configuration());
        assert!(KeeperError::DuplicateRegistration { key: "k".into() }.is_configuration());
        assert!(!KeeperError::Store("down".into()).is_configuration());
        assert!(!KeeperError::Handler("boom".into()).is_configuration());
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: KeeperError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, KeeperError::Serialization(_)));
    }
}
