use keeper_core::{emit_log, KeeperResult, LogLevel};
use tracing::debug;

use crate::registry::ServiceRegistry;

impl ServiceRegistry {
    /// 以租约时长为 TTL 写入本进程的服务通告，失败时发出 Error 日志通知
    pub async fn publish_heartbeat(&self) -> KeeperResult<()> {
        let (key, json, lease) = {
            let ad = self.advertisement.read().await;
            (ad.registry_key().to_string(), ad.to_json()?, ad.lease())
        };

        if let Err(e) = self.store.set(&key, &json, lease).await {
            emit_log(
                self.mediator.as_ref(),
                LogLevel::Error,
                format!("心跳发布失败 {key}: {e}"),
            );
            return Err(e);
        }
        debug!("心跳已发布: {}", key);
        Ok(())
    }
}
