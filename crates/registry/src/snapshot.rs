use std::collections::HashMap;

use keeper_core::{
    emit_log,
    models::{Notification, ServiceAdvertisement, REGISTRY_KEY_PREFIX},
    KeeperResult, LogLevel,
};
use tracing::debug;

use crate::registry::ServiceRegistry;

impl ServiceRegistry {
    /// 重建注册表快照，返回是否发出了变更通知
    ///
    /// 新快照整体替换旧快照；与旧快照按值比较有差异时发出一次 `RegistryChanged`。
    /// 读取失败时清空快照并从头重建，无论结果如何都发出通知。
    pub async fn refresh_snapshot(&self) -> bool {
        let (fresh, forced) = match self.load_snapshot().await {
            Ok(fresh) => (fresh, false),
            Err(e) => {
                emit_log(
                    self.mediator.as_ref(),
                    LogLevel::Error,
                    format!("刷新注册表快照失败，清空后重建: {e}"),
                );
                self.snapshot.lock().await.clear();
                let rebuilt = self.load_snapshot().await.unwrap_or_else(|e| {
                    emit_log(
                        self.mediator.as_ref(),
                        LogLevel::Error,
                        format!("重建注册表快照失败: {e}"),
                    );
                    HashMap::new()
                });
                (rebuilt, true)
            }
        };

        let peers = fresh.len();
        let changed = {
            let mut snapshot = self.snapshot.lock().await;
            let changed = *snapshot != fresh;
            *snapshot = fresh;
            changed
        };
        self.metrics.set_registry_peers(peers);

        if changed || forced {
            debug!("注册表快照已变化，当前 {} 个实例", peers);
            self.metrics.record_registry_change();
            self.mediator.publish(Notification::RegistryChanged);
            true
        } else {
            false
        }
    }

    async fn load_snapshot(&self) -> KeeperResult<HashMap<String, ServiceAdvertisement>> {
        let keys = self.store.list_keys(REGISTRY_KEY_PREFIX).await?;
        let mut fresh = HashMap::with_capacity(keys.len());

        for key in keys {
            // 列出之后过期的键直接跳过
            if let Some(json) = self.store.get(&key).await? {
                fresh.insert(key, ServiceAdvertisement::from_json(&json)?);
            }
        }
        Ok(fresh)
    }
}
