use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 关闭回调函数
pub type ShutdownHook =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// 关闭配置
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// 总超时时间
    pub total_timeout: Duration,
    /// 每个钩子的超时时间
    pub hook_timeout: Duration,
    /// 是否强制退出
    pub force_exit_on_timeout: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(30),
            hook_timeout: Duration::from_secs(10),
            force_exit_on_timeout: true,
        }
    }
}

/// 优雅停止管理器
///
/// 回调按注册的逆序执行：后初始化的组件（健康监控）先停，连接池最后关闭
pub struct ShutdownManager {
    is_shutting_down: Arc<AtomicBool>,
    shutdown_hooks: Arc<RwLock<Vec<(String, ShutdownHook)>>>,
    config: ShutdownConfig,
}

impl ShutdownManager {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            shutdown_hooks: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    pub fn new_default() -> Self {
        Self::new(ShutdownConfig::default())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::Acquire)
    }

    /// 注册关闭回调
    pub async fn register_shutdown_hook<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let boxed_hook: ShutdownHook = Box::new(move || Box::pin(hook()));

        let mut hooks = self.shutdown_hooks.write().await;
        hooks.push((name.clone(), boxed_hook));
        info!("注册关闭回调: {}", name);
    }

    /// 执行优雅关闭
    pub async fn shutdown(&self) -> Result<()> {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("关闭已在进行中");
            return Ok(());
        }

        info!("开始执行优雅关闭，总超时: {:?}", self.config.total_timeout);
        let start_time = tokio::time::Instant::now();

        let shutdown_result =
            tokio::time::timeout(self.config.total_timeout, self.execute_shutdown_hooks()).await;

        match shutdown_result {
            Ok(()) => {
                info!("优雅关闭完成，耗时: {:?}", start_time.elapsed());
                Ok(())
            }
            Err(_) => {
                error!("关闭超时 ({:?})", self.config.total_timeout);
                if self.config.force_exit_on_timeout {
                    error!("强制退出程序");
                    std::process::exit(1);
                }
                Err(anyhow::anyhow!(
                    "shutdown timed out after {:?}",
                    self.config.total_timeout
                ))
            }
        }
    }

    /// 执行所有关闭回调，单个回调失败或超时不影响后续回调
    async fn execute_shutdown_hooks(&self) {
        let hooks = self.shutdown_hooks.read().await;
        let hook_count = hooks.len();

        if hook_count == 0 {
            info!("没有注册的关闭回调");
            return;
        }

        for (index, (name, hook)) in hooks.iter().rev().enumerate() {
            let hook_start = tokio::time::Instant::now();
            info!("执行关闭回调 {}/{}: {}", index + 1, hook_count, name);

            match tokio::time::timeout(self.config.hook_timeout, hook()).await {
                Ok(Ok(())) => {
                    info!("关闭回调 {} 完成，耗时: {:?}", name, hook_start.elapsed());
                }
                Ok(Err(e)) => {
                    error!("关闭回调 {} 失败: {}", name, e);
                }
                Err(_) => {
                    error!("关闭回调 {} 超时 ({:?})", name, self.config.hook_timeout);
                }
            }
        }

        info!("所有关闭回调执行完成");
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            Ok(name)
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok("CTRL+C")
        }
    }
}
