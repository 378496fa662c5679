//! Redis 缓存存储

use std::time::Duration;

use anyhow::{anyhow, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, IntoConnectionInfo, Script};
use tracing::{debug, error};

use super::store::CacheStore;

/// 已存值的 `version` 大于 ARGV[2] 时不写入；ARGV[3] 为过期毫秒数，0 表示永不过期
const SET_IF_NEWER_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, decoded = pcall(cjson.decode, current)
  if ok and type(decoded) == 'table' then
    local cached = tonumber(decoded['version'])
    if cached and cached > tonumber(ARGV[2]) then
      return 0
    end
  end
end
local ttl = tonumber(ARGV[3])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[1])
end
return 1
"#;

/// 基于多路复用连接的 Redis 存储
///
/// `MultiplexedConnection` 可以廉价克隆，每次操作克隆一份即可并发使用
pub struct RedisCacheStore {
    conn: MultiplexedConnection,
    set_if_newer_script: Script,
}

impl RedisCacheStore {
    /// 建立连接并测试
    pub async fn connect(redis_url: &str, password: Option<&str>) -> Result<Self> {
        let mut info = redis_url
            .into_connection_info()
            .map_err(|e| anyhow!("Invalid Redis URL: {}", e))?;
        if let Some(password) = password {
            info.redis.password = Some(password.to_string());
        }

        let client = Client::open(info).map_err(|e| anyhow!("Failed to create Redis client: {}", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Redis connection test failed: {}", redis_url);
                anyhow!("Failed to get multiplexed connection: {}", e)
            })?;

        debug!("Redis连接初始化成功");
        Ok(Self {
            conn,
            set_if_newer_script: Script::new(SET_IF_NEWER_LUA),
        })
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            // 毫秒精度的过期时间，不足 1ms 的按 1ms 处理
            Some(ttl) => {
                let millis = ttl.as_millis().max(1) as u64;
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_if_newer(
        &self,
        key: &str,
        value: &[u8],
        version: i64,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let millis = ttl.map_or(0, |ttl| ttl.as_millis().max(1) as u64);
        // Lua 脚本在服务端原子执行，比较和写入之间不会插入其他命令
        let written: i64 = self
            .set_if_newer_script
            .key(key)
            .arg(value)
            .arg(version)
            .arg(millis)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(anyhow!("unexpected PING reply: {}", pong));
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
