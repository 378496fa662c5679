//! 缓存存储适配器
//!
//! 缓存只是加速手段：任何存储故障都降级为未命中（`get`）或空操作
//! （`set` / `delete`），记一次失败计数和一条 warn 日志，从不向上传播

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::redis_client::RedisCacheStore;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::store::CacheStore;
use crate::config::CacheConfig;

#[derive(Clone)]
pub struct CacheAdapter {
    store: Option<Arc<dyn CacheStore>>,
    op_timeout: Duration,
    stats: Arc<CacheStats>,
}

impl CacheAdapter {
    pub fn new(store: Arc<dyn CacheStore>, op_timeout: Duration) -> Self {
        Self {
            store: Some(store),
            op_timeout,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// 降级模式：所有操作都是空操作
    pub fn disabled() -> Self {
        Self {
            store: None,
            op_timeout: Duration::ZERO,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// 按配置连接 Redis，连接失败时进入降级模式，不阻塞启动
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("缓存已禁用 (CACHE_ENABLED=false)，所有读取直接访问数据库");
            return Self::disabled();
        }

        let connecting = RedisCacheStore::connect(&config.redis_url, config.redis_password.as_deref());
        match tokio::time::timeout(config.op_timeout.max(Duration::from_secs(1)), connecting).await {
            Ok(Ok(store)) => {
                let adapter = Self::new(Arc::new(store), config.op_timeout);
                if adapter.ping().await {
                    info!("Redis cache connected successfully: {}", config.redis_url);
                    adapter
                } else {
                    warn!("Redis PING 失败，缓存进入降级模式: {}", config.redis_url);
                    Self::disabled()
                }
            }
            Ok(Err(e)) => {
                warn!("Redis 不可用，缓存进入降级模式: {}", e);
                Self::disabled()
            }
            Err(_) => {
                warn!("连接 Redis 超时，缓存进入降级模式: {}", config.redis_url);
                Self::disabled()
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.store.is_none()
    }

    pub fn backend(&self) -> &'static str {
        self.store.as_ref().map_or("disabled", |s| s.backend())
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// 带超时执行一次存储操作，失败返回 `None`
    async fn guarded<T, F>(&self, op: &str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.stats.record_failure();
                warn!(op, key, error = %e, "缓存操作失败，降级处理");
                None
            }
            Err(_) => {
                self.stats.record_failure();
                warn!(op, key, timeout = ?self.op_timeout, "缓存操作超时，降级处理");
                None
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        self.guarded("get", key, store.get(key)).await.flatten()
    }

    /// 写入成功返回 true
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        self.guarded("set", key, store.set(key, value, ttl))
            .await
            .is_some()
    }

    /// 原子的版本比较写入
    ///
    /// `Some(true)` 已写入，`Some(false)` 缓存里的版本更新，`None` 存储故障或降级
    pub async fn set_if_newer(
        &self,
        key: &str,
        value: &[u8],
        version: i64,
        ttl: Option<Duration>,
    ) -> Option<bool> {
        let store = self.store.as_ref()?;
        self.guarded("set_if_newer", key, store.set_if_newer(key, value, version, ttl))
            .await
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        self.guarded("delete", key, store.delete(key))
            .await
            .is_some()
    }

    pub async fn ping(&self) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        self.guarded("ping", "-", store.ping()).await.is_some()
    }
}
