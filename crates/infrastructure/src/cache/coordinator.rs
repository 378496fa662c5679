//! 缓存协调器
//!
//! 在缓存适配器之上实现两种失效策略：
//! - 静态命名空间（user / settings）：不设过期时间，修改时先删后写
//! - 动态命名空间（portfolio / transactions / state）：总是带 TTL
//!
//! 协调器不访问数据库，未命中时由仓储查询后回调 `populate`

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quant_bot_common::utils::now_millis;
use quant_bot_core::cache::{CacheAdapter, CacheStatsSnapshot};
use quant_bot_core::config::TtlConfig;
use quant_bot_domain::{CacheClass, Namespace, Versioned};

/// 写入缓存的值，带上实体版本
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    version: i64,
    cached_at_ms: i64,
    value: T,
}

/// 动态命名空间在修改后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// 等待 TTL 自然过期
    #[default]
    Lazy,
    /// 立即删除缓存
    Eager,
}

#[derive(Clone)]
pub struct CacheCoordinator {
    adapter: CacheAdapter,
    ttl: TtlConfig,
}

impl CacheCoordinator {
    pub fn new(adapter: CacheAdapter, ttl: TtlConfig) -> Self {
        Self { adapter, ttl }
    }

    pub fn adapter(&self) -> &CacheAdapter {
        &self.adapter
    }

    /// 命名空间的默认 TTL，静态命名空间返回 `None`
    pub fn ttl_for(&self, ns: Namespace) -> Option<Duration> {
        match ns {
            Namespace::User | Namespace::Settings => None,
            Namespace::Portfolio => Some(self.ttl.portfolio),
            Namespace::Transactions => Some(self.ttl.transactions),
            Namespace::State => Some(self.ttl.state),
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.adapter.stats_snapshot()
    }

    pub async fn get<T: DeserializeOwned>(&self, ns: Namespace, key: i64) -> Option<T> {
        let cache_key = ns.key(key);
        let stats = self.adapter.stats();

        let Some(bytes) = self.adapter.get(&cache_key).await else {
            stats.record_miss();
            debug!("cache miss: {}", cache_key);
            return None;
        };

        match serde_json::from_slice::<CacheEnvelope<T>>(&bytes) {
            Ok(envelope) => {
                stats.record_hit();
                debug!("cache hit: {} (version {})", cache_key, envelope.version);
                Some(envelope.value)
            }
            Err(e) => {
                // 结构变更后的旧数据，删掉按未命中处理
                warn!("缓存条目无法解析，已删除: {} ({})", cache_key, e);
                self.adapter.delete(&cache_key).await;
                stats.record_miss();
                None
            }
        }
    }

    /// 写入静态命名空间，不设过期时间
    pub async fn set_static<T>(&self, ns: Namespace, key: i64, value: &T) -> bool
    where
        T: Serialize + Versioned,
    {
        if ns.class() != CacheClass::Static {
            warn!("拒绝写入：{} 是动态命名空间，必须带 TTL", ns);
            return false;
        }
        self.write(ns, key, value, None).await
    }

    /// 写入动态命名空间，`ttl` 为空时使用命名空间默认值
    pub async fn set_with_ttl<T>(
        &self,
        ns: Namespace,
        key: i64,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool
    where
        T: Serialize + Versioned,
    {
        if ns.class() != CacheClass::Dynamic {
            warn!("拒绝写入：{} 是静态命名空间，不能设置 TTL", ns);
            return false;
        }
        let Some(ttl) = ttl.or_else(|| self.ttl_for(ns)) else {
            return false;
        };
        if ttl.is_zero() {
            return false;
        }
        self.write(ns, key, value, Some(ttl)).await
    }

    fn encode<T>(&self, cache_key: &str, value: &T) -> Option<Vec<u8>>
    where
        T: Serialize + Versioned,
    {
        let envelope = CacheEnvelope {
            version: value.version(),
            cached_at_ms: now_millis(),
            value,
        };
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("缓存序列化失败: {} ({})", cache_key, e);
                None
            }
        }
    }

    async fn write<T>(&self, ns: Namespace, key: i64, value: &T, ttl: Option<Duration>) -> bool
    where
        T: Serialize + Versioned,
    {
        let cache_key = ns.key(key);
        let Some(bytes) = self.encode(&cache_key, value) else {
            return false;
        };

        let written = self.adapter.set(&cache_key, &bytes, ttl).await;
        if written {
            self.adapter.stats().record_write();
        }
        written
    }

    /// 只在缓存里没有更新版本时写入，比较和写入由存储原子完成
    ///
    /// 返回值同 `CacheAdapter::set_if_newer`
    async fn write_if_newer<T>(
        &self,
        ns: Namespace,
        key: i64,
        value: &T,
        ttl: Option<Duration>,
    ) -> Option<bool>
    where
        T: Serialize + Versioned,
    {
        let cache_key = ns.key(key);
        let bytes = self.encode(&cache_key, value)?;

        let written = self
            .adapter
            .set_if_newer(&cache_key, &bytes, value.version(), ttl)
            .await?;
        if written {
            self.adapter.stats().record_write();
        } else {
            self.adapter.stats().record_stale_discard();
            debug!("丢弃过期写入: {} (version {})", cache_key, value.version());
        }
        Some(written)
    }

    /// 读路径回填
    ///
    /// 已缓存的版本比待写入的新时丢弃本次写入，避免慢读者覆盖新数据
    pub async fn populate<T>(&self, ns: Namespace, key: i64, value: &T) -> bool
    where
        T: Serialize + Versioned,
    {
        let ttl = match ns.class() {
            CacheClass::Static => None,
            CacheClass::Dynamic => match self.ttl_for(ns) {
                Some(ttl) if !ttl.is_zero() => Some(ttl),
                _ => return false,
            },
        };
        self.write_if_newer(ns, key, value, ttl).await == Some(true)
    }

    /// 静态实体修改后：先删除，再写入修改后的值
    ///
    /// 写入失败时缓存保持为空，下次读取会从数据库回填。写入带版本比较，
    /// 删除之后抢先回填的旧值会被覆盖，晚到的旧值会被丢弃
    pub async fn refresh_static<T>(&self, ns: Namespace, key: i64, value: &T) -> bool
    where
        T: Serialize + Versioned,
    {
        if ns.class() != CacheClass::Static {
            warn!("拒绝写入：{} 是动态命名空间，必须带 TTL", ns);
            return false;
        }
        self.invalidate(ns, key).await;
        self.write_if_newer(ns, key, value, None).await == Some(true)
    }

    /// 删除缓存条目，键不存在时也是成功的空操作
    pub async fn invalidate(&self, ns: Namespace, key: i64) -> bool {
        let cache_key = ns.key(key);
        let deleted = self.adapter.delete(&cache_key).await;
        if deleted {
            self.adapter.stats().record_invalidation();
            debug!("cache invalidated: {}", cache_key);
        }
        deleted
    }

    /// 删除同一外部键在多个命名空间下的条目
    pub async fn invalidate_all(&self, key: i64, namespaces: &[Namespace]) {
        for ns in namespaces {
            self.invalidate(*ns, key).await;
        }
    }

    /// 按刷新策略处理动态命名空间
    pub async fn apply_policy(&self, ns: Namespace, key: i64, policy: RefreshPolicy) {
        if policy == RefreshPolicy::Eager {
            self.invalidate(ns, key).await;
        }
    }
}
