use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{KeeperError, KeeperResult};

/// 注册表键前缀，完整格式为 `RegistryService.{name} Host:{host}`
pub const REGISTRY_KEY_PREFIX: &str = "RegistryService.";

/// 选举键前缀，完整格式为 `ElectionService.{name}`
pub const ELECTION_KEY_PREFIX: &str = "ElectionService.";

/// 服务角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceRole {
    /// 持有任务图并发布任务
    Producer,
    /// 接收任务并回复执行结果
    Consumer,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceRole::Producer => write!(f, "Producer"),
            ServiceRole::Consumer => write!(f, "Consumer"),
        }
    }
}

impl std::str::FromStr for ServiceRole {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "producer" => Ok(ServiceRole::Producer),
            "consumer" => Ok(ServiceRole::Consumer),
            _ => Err(KeeperError::Configuration(format!("无效的服务角色: {s}"))),
        }
    }
}

/// 服务状态，只由选举循环修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    #[default]
    Standby,
}

/// 进程的服务通告
///
/// 进程启动时创建一次，之后只有 `status` 会被选举循环修改。
/// 相等性比较不包含 `status`，用于判断注册表中是否发生了有意义的变化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAdvertisement {
    name: String,
    #[serde(default)]
    description: String,
    host: String,
    role: ServiceRole,
    #[serde(default)]
    status: ServiceStatus,
    lease_seconds: u64,
    heartbeat_seconds: u64,
    election_key: String,
    registry_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_schema: Option<String>,
}

impl ServiceAdvertisement {
    /// 创建服务通告
    ///
    /// 心跳间隔必须不大于租约时长的一半，否则返回配置错误。
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        role: ServiceRole,
        lease: Duration,
        heartbeat: Duration,
    ) -> KeeperResult<Self> {
        let name = name.into();
        let host = host.into();

        if name.trim().is_empty() {
            return Err(KeeperError::Configuration("服务名称不能为空".to_string()));
        }
        if host.trim().is_empty() {
            return Err(KeeperError::Configuration("主机标识不能为空".to_string()));
        }

        let lease_seconds = lease.as_secs();
        let heartbeat_seconds = heartbeat.as_secs();
        validate_timing(lease_seconds, heartbeat_seconds)?;

        Ok(Self {
            election_key: election_key(&name),
            registry_key: registry_key(&name, &host),
            name,
            description: String::new(),
            host,
            role,
            status: ServiceStatus::Standby,
            lease_seconds,
            heartbeat_seconds,
            payload_schema: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_payload_schema(mut self, schema: impl Into<String>) -> Self {
        self.payload_schema = Some(schema.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ServiceStatus) {
        self.status = status;
    }

    pub fn is_active(&self) -> bool {
        self.status == ServiceStatus::Active
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    pub fn election_key(&self) -> &str {
        &self.election_key
    }

    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }

    pub fn payload_schema(&self) -> Option<&str> {
        self.payload_schema.as_deref()
    }

    pub fn to_json(&self) -> KeeperResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> KeeperResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl PartialEq for ServiceAdvertisement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.host == other.host
            && self.role == other.role
            && self.lease_seconds == other.lease_seconds
            && self.heartbeat_seconds == other.heartbeat_seconds
            && self.election_key == other.election_key
            && self.registry_key == other.registry_key
            && self.payload_schema == other.payload_schema
    }
}

impl Eq for ServiceAdvertisement {}

/// 注册表键：`RegistryService.{name} Host:{host}`
pub fn registry_key(name: &str, host: &str) -> String {
    format!("{REGISTRY_KEY_PREFIX}{name} Host:{host}")
}

/// 选举键：`ElectionService.{name}`
pub fn election_key(name: &str) -> String {
    format!("{ELECTION_KEY_PREFIX}{name}")
}

/// 校验租约与心跳的比例：heartbeat ≤ lease / 2
pub fn validate_timing(lease_seconds: u64, heartbeat_seconds: u64) -> KeeperResult<()> {
    if heartbeat_seconds == 0 {
        return Err(KeeperError::Configuration("心跳间隔必须大于0秒".to_string()));
    }
    if heartbeat_seconds.saturating_mul(2) > lease_seconds {
        return Err(KeeperError::Configuration(format!(
            "心跳间隔({heartbeat_seconds}s)不能超过租约时长({lease_seconds}s)的一半"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement() -> ServiceAdvertisement {
        ServiceAdvertisement::new(
            "billing",
            "host-a",
            ServiceRole::Consumer,
            Duration::from_secs(30),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_keys_are_derived_from_name_and_host() {
        let ad = advertisement();
        assert_eq!(ad.registry_key(), "RegistryService.billing Host:host-a");
        assert_eq!(ad.election_key(), "ElectionService.billing");
        assert_eq!(ad.status(), ServiceStatus::Standby);
    }

    #[test]
    fn test_heartbeat_must_not_exceed_half_lease() {
        let ok = ServiceAdvertisement::new(
            "svc",
            "h",
            ServiceRole::Producer,
            Duration::from_secs(20),
            Duration::from_secs(10),
        );
        assert!(ok.is_ok());

        let err = ServiceAdvertisement::new(
            "svc",
            "h",
            ServiceRole::Producer,
            Duration::from_secs(20),
            Duration::from_secs(11),
        )
        .unwrap_err();
        assert!(err.is_configuration());

        assert!(validate_timing(30, 0).is_err());
    }

    #[test]
    fn test_equality_ignores_status() {
        let a = advertisement();
        let mut b = advertisement();
        b.set_status(ServiceStatus::Active);
        assert_eq!(a, b);

        let c = advertisement().with_description("changed");
        assert_ne!(a, c);
    }

    #[test]
    fn test_json_round_trip() {
        let mut ad = advertisement()
            .with_description("账单服务")
            .with_payload_schema(r#"{"type":"object"}"#);
        ad.set_status(ServiceStatus::Active);

        let json = ad.to_json().unwrap();
        let back = ServiceAdvertisement::from_json(&json).unwrap();

        assert_eq!(ad, back);
        assert_eq!(back.status(), ServiceStatus::Active);
        assert_eq!(back.payload_schema(), Some(r#"{"type":"object"}"#));
        assert_eq!(back.lease(), Duration::from_secs(30));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("producer".parse::<ServiceRole>().unwrap(), ServiceRole::Producer);
        assert_eq!("Consumer".parse::<ServiceRole>().unwrap(), ServiceRole::Consumer);
        assert!("leader".parse::<ServiceRole>().is_err());
    }
}
