//! 缓存存储适配器

pub mod adapter;
pub mod redis_client;
pub mod stats;
pub mod store;

// 重新导出
pub use adapter::CacheAdapter;
pub use redis_client::RedisCacheStore;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{CacheStore, InMemoryCacheStore};
