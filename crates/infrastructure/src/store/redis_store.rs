use std::time::Duration;

use async_trait::async_trait;
use keeper_core::{config::RedisConfig, KeeperError, KeeperResult, KeyValueStore};
use redis::{aio::ConnectionManager, Client};
use tokio::time::sleep;
use tracing::{debug, error, warn};

const SCAN_BATCH_SIZE: usize = 100;

/// Redis-backed shared key-value store
///
/// Uses a multiplexed `ConnectionManager`, which reconnects on its own after
/// the server goes away; individual command failures surface as `Store` errors.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    connection: ConnectionManager,
}

impl RedisKeyValueStore {
    pub async fn new(config: &RedisConfig) -> KeeperResult<Self> {
        let client = Client::open(config.build_url())
            .map_err(|e| KeeperError::Store(format!("Failed to create Redis client: {e}")))?;

        let mut last_error = None;
        for attempt in 0..config.max_retry_attempts {
            let connect = tokio::time::timeout(
                Duration::from_secs(config.connection_timeout_seconds),
                client.get_connection_manager(),
            )
            .await;

            match connect {
                Ok(Ok(connection)) => {
                    let store = Self { connection };
                    store.ping().await?;
                    debug!(
                        "Successfully connected to Redis at {}:{} (db {})",
                        config.host, config.port, config.database
                    );
                    return Ok(store);
                }
                Ok(Err(e)) => last_error = Some(e.to_string()),
                Err(_) => last_error = Some("connection timed out".to_string()),
            }

            if attempt + 1 < config.max_retry_attempts {
                warn!(
                    "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}s...",
                    attempt + 1,
                    config.max_retry_attempts,
                    last_error.as_deref().unwrap_or("unknown"),
                    config.retry_delay_seconds
                );
                sleep(Duration::from_secs(config.retry_delay_seconds)).await;
            }
        }

        let error_msg = format!(
            "Failed to connect to Redis after {} attempts. Last error: {}",
            config.max_retry_attempts,
            last_error.unwrap_or_else(|| "Unknown".to_string())
        );
        error!("{}", error_msg);
        Err(KeeperError::Store(error_msg))
    }

    pub async fn ping(&self) -> KeeperResult<()> {
        let response: String = self.execute(&mut redis::cmd("PING")).await?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(KeeperError::Store(format!("Unexpected PING response: {response}")))
        }
    }

    async fn execute<T: redis::FromRedisValue>(&self, cmd: &mut redis::Cmd) -> KeeperResult<T> {
        let mut conn = self.connection.clone();
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| KeeperError::Store(format!("Redis command failed: {e}")))
    }
}

/// Compare-and-PEXPIRE, executed atomically on the server
const EXPIRE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

/// Escape glob metacharacters so the prefix is matched literally by SCAN MATCH
fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> KeeperResult<Option<String>> {
        self.execute(redis::cmd("GET").arg(key)).await
    }

    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> KeeperResult<bool> {
        let reply: Option<String> = self
            .execute(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .arg("NX"),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KeeperResult<()> {
        let _: String = self
            .execute(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis(ttl)),
            )
            .await?;
        Ok(())
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> KeeperResult<bool> {
        let updated: i64 = self
            .execute(
                redis::cmd("EVAL")
                    .arg(EXPIRE_IF_EQUALS_SCRIPT)
                    .arg(1)
                    .arg(key)
                    .arg(expected)
                    .arg(ttl_millis(ttl)),
            )
            .await?;
        Ok(updated == 1)
    }

    async fn delete(&self, key: &str) -> KeeperResult<bool> {
        let removed: i64 = self.execute(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn list_keys(&self, prefix: &str) -> KeeperResult<Vec<String>> {
        let pattern = escape_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .execute(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH_SIZE),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return the same key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
