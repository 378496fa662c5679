use std::fmt;
use std::time::Duration;

use super::environment::{env_is_true, env_millis, env_opt, env_or_default, env_secs};

/// 缓存配置
///
/// Redis 不可用时不会阻塞启动，适配器直接进入降级模式
#[derive(Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub redis_password: Option<String>,
    /// 单次缓存操作的超时，超时按失败处理
    pub op_timeout: Duration,
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            redis_password: None,
            op_timeout: Duration::from_millis(500),
            ttl: TtlConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_is_true("CACHE_ENABLED", true),
            redis_url: env_or_default("REDIS_HOST", "redis://127.0.0.1:6379/"),
            redis_password: env_opt("REDIS_PASSWORD"),
            op_timeout: env_millis("CACHE_OP_TIMEOUT_MS", 500),
            ttl: TtlConfig::from_env(),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("enabled", &self.enabled)
            .field("redis_url", &self.redis_url)
            .field("redis_password", &self.redis_password.as_ref().map(|_| "***"))
            .field("op_timeout", &self.op_timeout)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// 动态命名空间的默认 TTL
///
/// 交易记录变化快，TTL 最短；持仓聚合变化慢一些
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    pub portfolio: Duration,
    pub transactions: Duration,
    pub state: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            portfolio: Duration::from_secs(120),
            transactions: Duration::from_secs(30),
            state: Duration::from_secs(600),
        }
    }
}

impl TtlConfig {
    pub fn from_env() -> Self {
        Self {
            portfolio: env_secs("CACHE_TTL_PORTFOLIO_SECS", 120),
            transactions: env_secs("CACHE_TTL_TRANSACTIONS_SECS", 30),
            state: env_secs("CACHE_TTL_STATE_SECS", 600),
        }
    }
}
