use serde::{Deserialize, Serialize};

use crate::models::{validate_timing, ServiceRole};

/// 注册表中已存在本进程键时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// 拒绝启动
    #[default]
    Reject,
    /// 记录警告后继续
    Ignore,
}

/// 服务身份与租约配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub description: String,
    pub role: ServiceRole,
    /// 主机标识，为空时使用本机主机名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub lease_seconds: u64,
    pub heartbeat_seconds: u64,
    pub duplicate_policy: DuplicatePolicy,
    /// 描述任务负载结构的 schema，原样附加到服务通告
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_schema: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service-keeper".to_string(),
            description: String::new(),
            role: ServiceRole::Consumer,
            host: None,
            lease_seconds: 30,
            heartbeat_seconds: 10,
            duplicate_policy: DuplicatePolicy::default(),
            payload_schema: None,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow::anyhow!("服务名称不能为空"));
        }

        if self.name.contains(char::is_whitespace) {
            return Err(anyhow::anyhow!("服务名称不能包含空白字符: {}", self.name));
        }

        if let Some(host) = &self.host {
            if host.trim().is_empty() {
                return Err(anyhow::anyhow!("主机标识不能为空字符串"));
            }
        }

        validate_timing(self.lease_seconds, self.heartbeat_seconds)?;

        Ok(())
    }
}
