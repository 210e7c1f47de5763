use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{ServiceAdvertisement, ServiceRole};

/// 服务目录，提供注册表快照上的查询
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// 当前快照的时间点副本，键为注册表键
    async fn snapshot(&self) -> HashMap<String, ServiceAdvertisement>;

    /// 查找指定逻辑名称下处于 Active 状态的实例
    async fn find_active(&self, name: &str) -> Option<ServiceAdvertisement> {
        self.snapshot()
            .await
            .into_values()
            .find(|ad| ad.name() == name && ad.is_active())
    }

    /// 查找处于 Active 状态的生产者
    async fn find_active_producer(&self) -> Option<ServiceAdvertisement> {
        self.snapshot()
            .await
            .into_values()
            .find(|ad| ad.role() == ServiceRole::Producer && ad.is_active())
    }
}
