//! 优雅关闭
//!
//! ShutdownManager 监听 Ctrl+C / SIGTERM（或由 REPL 的 quit 触发），之后 ShutdownCoordinator
//! 按注册顺序执行清理任务（如回收所有会话处理任务）；每个清理任务有超时，失败只记录日志。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户退出（Ctrl+C 或 quit）
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 输入流结束
    InputClosed,
}

/// 关闭信号：一个 token 加最先到达的原因
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason_tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = watch::channel(None);
        Self {
            token: CancellationToken::new(),
            reason_tx: Arc::new(reason_tx),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.reason_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason_tx.borrow().clone()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装 Ctrl+C 与 SIGTERM 处理
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => {
                    tracing::info!("received Ctrl+C, shutting down");
                    manager.shutdown(ShutdownReason::UserInitiated);
                }
                _ = terminate => {
                    tracing::info!("received SIGTERM, shutting down");
                    manager.shutdown(ShutdownReason::Signal);
                }
                _ = manager.wait_for_shutdown() => {}
            }
        });
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时执行的清理
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

pub struct ShutdownCoordinator {
    cleanups: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            cleanups: Vec::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn register(&mut self, cleanup: impl ShutdownCleanup + 'static) {
        self.cleanups.push(Arc::new(cleanup));
    }

    /// 依次执行；返回成功完成的数量
    pub async fn run_cleanup(&self) -> usize {
        let mut succeeded = 0;
        for cleanup in &self.cleanups {
            let name = cleanup.name();
            match tokio::time::timeout(self.timeout, cleanup.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!(cleanup = name, "cleanup finished");
                    succeeded += 1;
                }
                Ok(Err(e)) => tracing::warn!(cleanup = name, error = %e, "cleanup failed"),
                Err(_) => tracing::warn!(
                    cleanup = name,
                    timeout_secs = self.timeout.as_secs(),
                    "cleanup timed out"
                ),
            }
        }
        succeeded
    }
}

/// 运行 app 直到其结束或收到关闭信号，然后执行清理
pub async fn run_until_shutdown<F>(manager: &ShutdownManager, app: F, coordinator: &ShutdownCoordinator)
where
    F: Future<Output = ()>,
{
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => tracing::info!("application finished"),
        _ = manager.wait_for_shutdown() => {
            tracing::info!(reason = ?manager.reason(), "shutdown requested");
        }
    }

    coordinator.run_cleanup().await;
}
