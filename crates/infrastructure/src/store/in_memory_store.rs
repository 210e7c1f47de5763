use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::{KeeperError, KeeperResult, KeyValueStore};
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// 进程内键值存储
///
/// 过期时间基于 `tokio::time::Instant`，测试中可以用 `tokio::time::pause` 与
/// `advance` 模拟租约过期。`set_unavailable` 用于模拟存储故障。
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可用，之后的所有操作都返回错误
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> KeeperResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(KeeperError::Store("in-memory store is unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> KeeperResult<Option<String>> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> KeeperResult<bool> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KeeperResult<()> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> KeeperResult<bool> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> KeeperResult<bool> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        Ok(entries.remove(key).is_some())
    }

    async fn list_keys(&self, prefix: &str) -> KeeperResult<Vec<String>> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
