//! 缓存存储接口与内存实现

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::time::Instant;

/// 键值缓存存储
///
/// 实现只负责字节读写，降级和超时由 `CacheAdapter` 处理
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// `ttl` 为 `None` 时永不过期
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// 版本比较和写入是一次原子操作
    ///
    /// 已存值是带顶层 `version` 字段的 JSON 且该版本大于 `version` 时不写入，返回 false；
    /// 键不存在、已过期或无法解析时直接写入
    async fn set_if_newer(
        &self,
        key: &str,
        value: &[u8],
        version: i64,
        ttl: Option<Duration>,
    ) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    /// 日志里展示的后端名称
    fn backend(&self) -> &'static str;
}

#[derive(Deserialize)]
struct StoredVersion {
    version: i64,
}

/// 已存值携带的版本号
fn stored_version(bytes: &[u8]) -> Option<i64> {
    serde_json::from_slice::<StoredVersion>(bytes)
        .ok()
        .map(|v| v.version)
}

#[derive(Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expire_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.map_or(false, |expire_at| now >= expire_at)
    }
}

/// 内存缓存实现（使用DashMap）
///
/// 本地运行和测试使用；过期按 tokio 时钟判断，暂停时间的测试可以直接推进
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    map: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 剩余存活时间；不存在或已过期返回 `None`，永不过期返回 `Some(None)`
    pub fn remaining_ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let entry = self.map.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(entry.expire_at.map(|at| at - now))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.remaining_ttl(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 清理已过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.map.len())
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(entry) = self.map.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
            // 过期则删除
            drop(entry);
            self.map.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            expire_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.map.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_newer(
        &self,
        key: &str,
        value: &[u8],
        version: i64,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let now = Instant::now();
        let entry = CacheEntry {
            value: value.to_vec(),
            expire_at: ttl.map(|ttl| now + ttl),
        };
        // entry 持有分片写锁，比较和写入之间不会插入其他写者
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let newer_cached = !current.is_expired(now)
                    && stored_version(&current.value).map_or(false, |cached| cached > version);
                if newer_cached {
                    return Ok(false);
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = InMemoryCacheStore::new();
        store
            .set("portfolio:7", b"v1", Some(Duration::from_secs(2)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("portfolio:7").await.unwrap(), Some(b"v1".to_vec()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("portfolio:7").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_without_ttl_never_expires() {
        let store = InMemoryCacheStore::new();
        store.set("user:42", b"u", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(store.remaining_ttl("user:42"), Some(None));
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = InMemoryCacheStore::new();
        store.set("a", b"1", Some(Duration::from_secs(1))).await.unwrap();
        store.set("b", b"2", Some(Duration::from_secs(10))).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.contains("b"));
        assert!(!store.contains("a"));
    }

    #[tokio::test]
    async fn test_set_if_newer_keeps_higher_version() {
        let store = InMemoryCacheStore::new();
        assert!(store
            .set_if_newer("user:42", br#"{"version":3}"#, 3, None)
            .await
            .unwrap());
        assert!(!store
            .set_if_newer("user:42", br#"{"version":2}"#, 2, None)
            .await
            .unwrap());
        assert_eq!(
            store.get("user:42").await.unwrap(),
            Some(br#"{"version":3}"#.to_vec())
        );

        // 相同版本允许覆盖
        assert!(store
            .set_if_newer("user:42", br#"{"version":3,"n":1}"#, 3, None)
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_newer_ignores_expired_and_unversioned() {
        let store = InMemoryCacheStore::new();
        store
            .set("portfolio:7", br#"{"version":9}"#, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store
            .set_if_newer("portfolio:7", br#"{"version":1}"#, 1, Some(Duration::from_secs(5)))
            .await
            .unwrap());

        store.set("user:1", b"not json", None).await.unwrap();
        assert!(store
            .set_if_newer("user:1", br#"{"version":1}"#, 1, None)
            .await
            .unwrap());
        assert_eq!(stored_version(b"not json"), None);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = InMemoryCacheStore::new();
        assert!(store.delete("user:404").await.is_ok());
        assert!(store.delete("user:404").await.is_ok());
    }
}
