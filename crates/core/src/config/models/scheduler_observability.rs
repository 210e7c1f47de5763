use serde::{Deserialize, Serialize};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// SpecificTime 触发器的轮询周期（秒）
    pub specific_time_poll_seconds: u64,
    /// 任务图 JSON 文件，仅生产者读取
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_file: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            specific_time_poll_seconds: 30,
            tasks_file: None,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        // 轮询周期必须小于一分钟，否则分钟级的时间点可能被跳过
        if self.specific_time_poll_seconds == 0 || self.specific_time_poll_seconds >= 60 {
            return Err(anyhow::anyhow!(
                "SpecificTime 轮询周期必须在1-59秒之间: {}",
                self.specific_time_poll_seconds
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }

        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }

        if self.metrics_enabled {
            self.metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow::anyhow!("无效的指标监听地址 {}: {e}", self.metrics_bind_address))?;
        }

        Ok(())
    }
}
