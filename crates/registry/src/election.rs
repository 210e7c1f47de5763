use std::time::Duration;

use keeper_core::{emit_log, models::ServiceStatus, KeeperResult, LogLevel};
use tracing::debug;

use crate::registry::ServiceRegistry;

impl ServiceRegistry {
    /// 执行一轮选举，返回本轮结束后的状态
    ///
    /// Active 实例刷新选举键的 TTL，刷新失败即降为 Standby；Standby 实例尝试条件创建
    /// 选举键，成功即升为 Active。任何存储错误都降为 Standby。
    pub async fn run_election(&self) -> ServiceStatus {
        let (current, key, host, lease) = {
            let ad = self.advertisement.read().await;
            (
                ad.status(),
                ad.election_key().to_string(),
                ad.host().to_string(),
                ad.lease(),
            )
        };

        let next = match current {
            ServiceStatus::Active => match self.renew_leadership(&key, &host, lease).await {
                Ok(true) => ServiceStatus::Active,
                Ok(false) => {
                    emit_log(
                        self.mediator.as_ref(),
                        LogLevel::Warning,
                        format!("选举键 {key} 已失效或被其他实例持有，降为 Standby"),
                    );
                    ServiceStatus::Standby
                }
                Err(e) => {
                    emit_log(
                        self.mediator.as_ref(),
                        LogLevel::Error,
                        format!("刷新选举键 {key} 失败，降为 Standby: {e}"),
                    );
                    ServiceStatus::Standby
                }
            },
            ServiceStatus::Standby => match self.store.set_if_not_exists(&key, &host, lease).await {
                Ok(true) => {
                    emit_log(
                        self.mediator.as_ref(),
                        LogLevel::Info,
                        format!("{host} 赢得选举 {key}，升为 Active"),
                    );
                    ServiceStatus::Active
                }
                Ok(false) => {
                    debug!("选举键 {} 已被其他实例持有", key);
                    ServiceStatus::Standby
                }
                Err(e) => {
                    emit_log(
                        self.mediator.as_ref(),
                        LogLevel::Error,
                        format!("竞选 {key} 失败: {e}"),
                    );
                    ServiceStatus::Standby
                }
            },
        };

        if next != current {
            self.advertisement.write().await.set_status(next);
            self.metrics.set_election_active(next == ServiceStatus::Active);
            // 尽快让对等进程看到新状态
            let _ = self.publish_heartbeat().await;
        }

        next
    }

    /// 只有选举键仍由本机持有时才刷新 TTL
    async fn renew_leadership(&self, key: &str, host: &str, lease: Duration) -> KeeperResult<bool> {
        self.store.expire_if_equals(key, host, lease).await
    }

    /// 如果当前为 Active，删除选举键并降为 Standby，失败只记录日志
    pub async fn unelect(&self) {
        let key = {
            let mut ad = self.advertisement.write().await;
            if ad.status() != ServiceStatus::Active {
                return;
            }
            ad.set_status(ServiceStatus::Standby);
            ad.election_key().to_string()
        };
        self.metrics.set_election_active(false);

        match self.store.delete(&key).await {
            Ok(_) => debug!("已退选: {}", key),
            Err(e) => emit_log(
                self.mediator.as_ref(),
                LogLevel::Warning,
                format!("退选失败 {key}: {e}"),
            ),
        }
    }
}
