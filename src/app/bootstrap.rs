//! 应用组装
//!
//! 连接池、缓存适配器、协调器、执行器和仓储都在这里构造一次，
//! 以 `Arc` 注入，不使用全局单例

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use quant_bot_core::cache::{CacheAdapter, CacheStatsSnapshot};
use quant_bot_core::config::shutdown_manager::ShutdownManager;
use quant_bot_core::config::AppConfig;
use quant_bot_core::database::{
    ConnectionPool, Connector, HealthMonitor, PgConnector, PoolState, PoolStatus, QueryExecutor,
};
use quant_bot_domain::traits::{
    PortfolioRepository, SettingsRepository, StateRepository, TransactionRepository,
    UserRepository,
};
use quant_bot_infrastructure::{
    ensure_schema, CacheCoordinator, CachedPortfolioRepository, CachedSettingsRepository,
    CachedStateRepository, CachedTransactionRepository, CachedUserRepository,
};

/// 数据层句柄
#[derive(Clone)]
pub struct DataLayer {
    pub config: AppConfig,
    pub executor: Arc<QueryExecutor>,
    pub cache: Arc<CacheCoordinator>,
    pub users: Arc<dyn UserRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub portfolio: Arc<dyn PortfolioRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub states: Arc<dyn StateRepository>,
}

impl DataLayer {
    /// 按配置连接 Postgres 和 Redis
    ///
    /// Redis 不可用不影响启动；数据库不可用时连接池标记为不健康，
    /// 由健康监控负责重连
    pub async fn build(config: AppConfig) -> Result<Self> {
        let connector = Arc::new(PgConnector::new(&config.database)?);
        let adapter = CacheAdapter::connect(&config.cache).await;
        Self::from_parts(connector, adapter, config).await
    }

    pub async fn from_parts(
        connector: Arc<dyn Connector>,
        adapter: CacheAdapter,
        config: AppConfig,
    ) -> Result<Self> {
        info!("连接数据库: {}", connector.describe());
        let pool = ConnectionPool::new(connector, config.database.pool.clone());
        if let Err(e) = pool.initialize().await {
            warn!("数据库初始化失败，等待健康监控重连: {}", e);
        }

        let executor = Arc::new(QueryExecutor::new(pool, config.database.executor.clone()));
        if config.database.auto_migrate && executor.pool().is_healthy() {
            ensure_schema(&executor).await?;
        }

        let cache = Arc::new(CacheCoordinator::new(adapter, config.cache.ttl));
        info!(
            "缓存后端: {}{}",
            cache.adapter().backend(),
            if cache.adapter().is_degraded() { " (降级)" } else { "" }
        );

        Ok(Self {
            users: Arc::new(CachedUserRepository::new(executor.clone(), cache.clone())),
            settings: Arc::new(CachedSettingsRepository::new(executor.clone(), cache.clone())),
            portfolio: Arc::new(CachedPortfolioRepository::new(executor.clone(), cache.clone())),
            transactions: Arc::new(CachedTransactionRepository::new(
                executor.clone(),
                cache.clone(),
            )),
            states: Arc::new(CachedStateRepository::new(executor.clone(), cache.clone())),
            config,
            executor,
            cache,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.executor.pool()
    }

    pub async fn migrate(&self) -> Result<()> {
        ensure_schema(&self.executor).await?;
        Ok(())
    }

    /// 注册关闭回调：先停健康监控，再关闭连接池
    pub async fn register_shutdown_hooks(&self, manager: &ShutdownManager, monitor: HealthMonitor) {
        let pool = self.pool().clone();
        manager
            .register_shutdown_hook("connection_pool", move || {
                let pool = pool.clone();
                async move {
                    pool.close().await;
                    Ok(())
                }
            })
            .await;

        let monitor = Arc::new(Mutex::new(monitor));
        manager
            .register_shutdown_hook("health_monitor", move || {
                let monitor = monitor.clone();
                async move {
                    monitor.lock().await.stop().await;
                    Ok(())
                }
            })
            .await;
    }

    /// 主动探测一次数据库和缓存
    pub async fn health_report(&self) -> HealthReport {
        let store_ok = self.pool().health_check().await;
        let cache_ok = self.cache.adapter().ping().await;
        HealthReport {
            store_ok,
            pool_status: self.pool().status(),
            pool: self.pool().state(),
            cache_backend: self.cache.adapter().backend(),
            cache_ok,
            cache_stats: self.cache.stats(),
        }
    }
}

/// 健康检查结果
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub store_ok: bool,
    pub pool_status: PoolStatus,
    pub pool: PoolState,
    pub cache_backend: &'static str,
    pub cache_ok: bool,
    pub cache_stats: CacheStatsSnapshot,
}

impl HealthReport {
    /// 缓存故障只算降级，数据库不可用才算不健康
    pub fn is_healthy(&self) -> bool {
        self.store_ok
    }

    pub fn to_json(&self) -> Value {
        json!({
            "healthy": self.is_healthy(),
            "store": {
                "ok": self.store_ok,
                "status": format!("{:?}", self.pool_status),
                "active": self.pool.active,
                "idle": self.pool.idle,
                "waiting": self.pool.waiting,
                "max": self.pool.max,
                "consecutive_failures": self.pool.consecutive_failures,
                "reconnect_attempts": self.pool.reconnect_attempts,
                "generation": self.pool.generation,
            },
            "cache": {
                "backend": self.cache_backend,
                "ok": self.cache_ok,
                "hits": self.cache_stats.hits,
                "misses": self.cache_stats.misses,
                "failures": self.cache_stats.failures,
                "hit_ratio": self.cache_stats.hit_ratio(),
            },
        })
    }
}

/// 启动数据层并阻塞到收到退出信号
pub async fn serve(config: AppConfig) -> Result<()> {
    let data = DataLayer::build(config).await?;
    let monitor = data.pool().spawn_health_monitor();

    let shutdown = ShutdownManager::new_default();
    data.register_shutdown_hooks(&shutdown, monitor).await;

    let report = data.health_report().await;
    info!("数据层已启动: {}", report.to_json());

    let signal = ShutdownManager::wait_for_shutdown_signal().await?;
    info!("接收到 {} 信号，开始优雅关闭...", signal);
    shutdown.shutdown().await?;

    info!("应用已优雅退出");
    Ok(())
}

pub async fn health(config: AppConfig) -> Result<HealthReport> {
    let data = DataLayer::build(config).await?;
    let report = data.health_report().await;
    data.pool().close().await;
    Ok(report)
}

pub async fn migrate(config: AppConfig) -> Result<()> {
    let data = DataLayer::build(config).await?;
    if !data.pool().is_healthy() {
        return Err(anyhow!("数据库不可用，无法建表"));
    }
    data.migrate().await?;
    data.pool().close().await;
    Ok(())
}
