use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 关闭信号只发送一次；关闭之后才订阅的接收者会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    is_shutdown: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        if self.is_shutdown() {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        self.shutdown_tx.subscribe()
    }

    /// 触发关闭，重复调用无效
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            debug!("关闭管理器已经触发过关闭");
            return;
        }

        debug!("发送关闭信号给 {} 个订阅者", self.shutdown_tx.receiver_count());
        // 没有接收者时忽略错误
        let _ = self.shutdown_tx.send(());
        info!("关闭信号已发送");
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// 触发关闭并等待应用任务结束，超时返回 `false`
    pub async fn shutdown_and_wait(&self, app: JoinHandle<()>, timeout: Duration) -> bool {
        self.shutdown();
        match tokio::time::timeout(timeout, app).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("应用任务异常结束: {}", e);
                true
            }
            Err(_) => {
                warn!("应用关闭超时（{}秒）", timeout.as_secs());
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signal_once() {
        let manager = ShutdownManager::new();
        let mut first = manager.subscribe();
        let mut second = manager.clone().subscribe();

        manager.shutdown();
        manager.shutdown();

        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(first.try_recv().is_err());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscriber_is_signalled_immediately() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        let mut late = manager.subscribe();
        assert!(late.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_wait_times_out() {
        let manager = ShutdownManager::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!manager.shutdown_and_wait(stuck, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shutdown_and_wait_joins_app() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        let app = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        assert!(manager.shutdown_and_wait(app, Duration::from_secs(5)).await);
    }
}
