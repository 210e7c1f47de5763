use std::time::Duration;

use async_trait::async_trait;

use crate::errors::KeeperResult;

/// 共享键值存储抽象接口
///
/// 注册表与选举只依赖这组操作，具体实现可以是 Redis，也可以是测试用的内存存储。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 读取键值，键不存在时返回 `None`
    async fn get(&self, key: &str) -> KeeperResult<Option<String>>;

    /// 键不存在时写入并设置过期时间，返回是否写入成功
    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> KeeperResult<bool>;

    /// 无条件写入并设置过期时间
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KeeperResult<()>;

    /// 键的当前值等于 `expected` 时刷新过期时间，比较与刷新是一次原子操作
    ///
    /// 键不存在或值不同时返回 `false`。
    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> KeeperResult<bool>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> KeeperResult<bool>;

    /// 列出所有以 `prefix` 开头的键
    async fn list_keys(&self, prefix: &str) -> KeeperResult<Vec<String>>;
}
