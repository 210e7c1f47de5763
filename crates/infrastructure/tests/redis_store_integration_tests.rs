use std::time::Duration;

use anyhow::Result;
use keeper_core::{config::RedisConfig, KeyValueStore};
use keeper_infrastructure::RedisKeyValueStore;
use testcontainers::ImageExt;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;
use tokio::time::sleep;

async fn start_redis() -> Result<(ContainerAsync<Redis>, RedisKeyValueStore)> {
    let container = Redis::default().with_tag("7-alpine").start().await?;
    let port = container.get_host_port_ipv4(6379).await?;

    let config = RedisConfig {
        host: "localhost".to_string(),
        port,
        ..RedisConfig::default()
    };
    let store = RedisKeyValueStore::new(&config).await?;
    Ok((container, store))
}

#[tokio::test]
#[ignore] // 需要Docker运行Redis
async fn test_conditional_set_and_expire() -> Result<()> {
    let (_container, store) = start_redis().await?;
    let ttl = Duration::from_secs(2);

    assert!(store.set_if_not_exists("ElectionService.svc", "host-a", ttl).await?);
    assert!(!store.set_if_not_exists("ElectionService.svc", "host-b", ttl).await?);
    assert_eq!(
        store.get("ElectionService.svc").await?.as_deref(),
        Some("host-a")
    );

    assert!(!store.expire_if_equals("ElectionService.svc", "host-b", ttl).await?);
    assert!(store.expire_if_equals("ElectionService.svc", "host-a", ttl).await?);
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.get("ElectionService.svc").await?, None);
    assert!(!store.expire_if_equals("ElectionService.svc", "host-a", ttl).await?);

    Ok(())
}

#[tokio::test]
#[ignore] // 需要Docker运行Redis
async fn test_list_keys_and_delete() -> Result<()> {
    let (_container, store) = start_redis().await?;
    let ttl = Duration::from_secs(30);

    for i in 0..250 {
        store
            .set(&format!("RegistryService.svc{i} Host:h"), "{}", ttl)
            .await?;
    }
    store.set("ElectionService.svc0", "h", ttl).await?;

    let keys = store.list_keys("RegistryService.").await?;
    assert_eq!(keys.len(), 250);

    assert!(store.delete("RegistryService.svc0 Host:h").await?);
    assert!(!store.delete("RegistryService.svc0 Host:h").await?);
    assert_eq!(store.list_keys("RegistryService.").await?.len(), 249);

    Ok(())
}
