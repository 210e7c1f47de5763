use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::{
    config::DuplicatePolicy,
    models::{ServiceAdvertisement, ServiceStatus},
    emit_log, KeeperError, KeeperResult, KeyValueStore, LogLevel, Mediator, ServiceDirectory,
};
use keeper_infrastructure::MetricsCollector;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
enum RegistryLoop {
    Heartbeat,
    Election,
    Snapshot,
}

/// 服务注册表
///
/// 通过 [`ServiceRegistry::new`] 创建后调用 [`ServiceRegistry::start`] 启动周期循环；
/// 每个循环的单次执行也以公开方法提供，便于测试按步驱动。
pub struct ServiceRegistry {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) mediator: Arc<dyn Mediator>,
    pub(crate) advertisement: RwLock<ServiceAdvertisement>,
    pub(crate) snapshot: Mutex<HashMap<String, ServiceAdvertisement>>,
    pub(crate) metrics: MetricsCollector,
    shutdown_tx: broadcast::Sender<()>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    is_running: RwLock<bool>,
}

impl ServiceRegistry {
    /// 创建注册表
    ///
    /// 如果共享存储中已经存在本进程的注册键，按 `policy` 决定拒绝启动还是忽略。
    pub async fn new(
        store: Arc<dyn KeyValueStore>,
        mediator: Arc<dyn Mediator>,
        advertisement: ServiceAdvertisement,
        policy: DuplicatePolicy,
    ) -> KeeperResult<Arc<Self>> {
        let key = advertisement.registry_key().to_string();
        if store.get(&key).await?.is_some() {
            match policy {
                DuplicatePolicy::Reject => {
                    emit_log(
                        mediator.as_ref(),
                        LogLevel::Fatal,
                        format!("服务已注册，拒绝启动: {key}"),
                    );
                    return Err(KeeperError::DuplicateRegistration { key });
                }
                DuplicatePolicy::Ignore => {
                    emit_log(
                        mediator.as_ref(),
                        LogLevel::Warning,
                        format!("服务已注册，忽略并继续启动: {key}"),
                    );
                }
            }
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Arc::new(Self {
            store,
            mediator,
            advertisement: RwLock::new(advertisement),
            snapshot: Mutex::new(HashMap::new()),
            metrics: MetricsCollector::new(),
            shutdown_tx,
            loops: Mutex::new(Vec::new()),
            is_running: RwLock::new(false),
        }))
    }

    /// 执行一轮心跳、选举与快照刷新，然后启动三个周期循环
    pub async fn start(self: &Arc<Self>) -> KeeperResult<()> {
        {
            let mut is_running = self.is_running.write().await;
            if *is_running {
                return Ok(());
            }
            *is_running = true;
        }

        let (heartbeat, lease, key) = {
            let ad = self.advertisement.read().await;
            (ad.heartbeat_interval(), ad.lease(), ad.registry_key().to_string())
        };

        // 失败已通过日志通知上报，由后续循环重试
        let _ = self.publish_heartbeat().await;
        self.run_election().await;
        self.refresh_snapshot().await;

        let mut loops = self.loops.lock().await;
        loops.push(self.spawn_loop(RegistryLoop::Heartbeat, heartbeat));
        loops.push(self.spawn_loop(RegistryLoop::Election, heartbeat));
        loops.push(self.spawn_loop(RegistryLoop::Snapshot, lease));

        info!("注册表已启动: {}", key);
        Ok(())
    }

    fn spawn_loop(self: &Arc<Self>, kind: RegistryLoop, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.tick(kind).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("{:?} 循环收到关闭信号", kind);
                        break;
                    }
                }
            }
        })
    }

    async fn tick(&self, kind: RegistryLoop) {
        match kind {
            RegistryLoop::Heartbeat => {
                let _ = self.publish_heartbeat().await;
            }
            RegistryLoop::Election => {
                self.run_election().await;
            }
            RegistryLoop::Snapshot => {
                self.refresh_snapshot().await;
            }
        }
    }

    /// 停止循环，然后退选、注销
    pub async fn shutdown(&self) {
        let was_running = std::mem::replace(&mut *self.is_running.write().await, false);

        if was_running {
            let _ = self.shutdown_tx.send(());
            let handles: Vec<_> = self.loops.lock().await.drain(..).collect();
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("等待注册表循环结束失败: {}", e);
                }
            }
        }

        self.unelect().await;
        self.unregister().await;
        info!("注册表已关闭");
    }

    /// 删除本进程的注册键，失败只记录日志
    pub async fn unregister(&self) {
        let key = self.advertisement.read().await.registry_key().to_string();
        match self.store.delete(&key).await {
            Ok(_) => debug!("已注销: {}", key),
            Err(e) => emit_log(
                self.mediator.as_ref(),
                LogLevel::Warning,
                format!("注销失败 {key}: {e}"),
            ),
        }
    }

    /// 本进程服务通告的副本
    pub async fn advertisement(&self) -> ServiceAdvertisement {
        self.advertisement.read().await.clone()
    }

    pub async fn status(&self) -> ServiceStatus {
        self.advertisement.read().await.status()
    }

    pub async fn is_active(&self) -> bool {
        self.status().await == ServiceStatus::Active
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

#[async_trait]
impl ServiceDirectory for ServiceRegistry {
    async fn snapshot(&self) -> HashMap<String, ServiceAdvertisement> {
        self.snapshot.lock().await.clone()
    }
}
