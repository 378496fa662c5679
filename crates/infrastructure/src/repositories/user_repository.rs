//! 用户仓储实现
//!
//! user 是静态命名空间：创建后立即写缓存，修改后先删后写，删除时清理
//! 该用户在所有命名空间下的缓存（数据库侧由外键级联删除）

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use quant_bot_common::utils::now_millis;
use quant_bot_common::{AppError, Result};
use quant_bot_core::database::{QueryExecutor, SqlValue};
use quant_bot_domain::traits::UserRepository;
use quant_bot_domain::{Namespace, NewUser, User, UserPatch};

use super::{decode_first, require_first};
use crate::cache::CacheCoordinator;

macro_rules! user_columns {
    () => {
        "id, user_key, username, language, is_active, created_at, updated_at, version"
    };
}

pub mod sql {
    pub const SELECT_BY_KEY: &str =
        concat!("SELECT ", user_columns!(), " FROM users WHERE user_key = $1");

    pub const INSERT: &str = concat!(
        "INSERT INTO users (user_key, username, language, is_active, created_at, updated_at, version) ",
        "VALUES ($1, $2, $3, TRUE, $4, $4, 1) RETURNING ",
        user_columns!()
    );

    pub const UPDATE: &str = concat!(
        "UPDATE users SET username = COALESCE($2, username), language = COALESCE($3, language), ",
        "is_active = COALESCE($4, is_active), updated_at = $5, version = version + 1 ",
        "WHERE user_key = $1 RETURNING ",
        user_columns!()
    );

    pub const DELETE: &str = "DELETE FROM users WHERE user_key = $1 RETURNING id";
}

pub struct CachedUserRepository {
    executor: Arc<QueryExecutor>,
    cache: Arc<CacheCoordinator>,
}

impl CachedUserRepository {
    pub fn new(executor: Arc<QueryExecutor>, cache: Arc<CacheCoordinator>) -> Self {
        Self { executor, cache }
    }

    async fn load(&self, user_key: i64) -> Result<Option<User>> {
        let rows = self
            .executor
            .query_retrying(sql::SELECT_BY_KEY, &[SqlValue::from(user_key)])
            .await?;
        decode_first(rows)
    }
}

#[async_trait]
impl UserRepository for CachedUserRepository {
    async fn get(&self, user_key: i64) -> Result<User> {
        self.find(user_key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {}", user_key)))
    }

    async fn find(&self, user_key: i64) -> Result<Option<User>> {
        if let Some(user) = self.cache.get::<User>(Namespace::User, user_key).await {
            return Ok(Some(user));
        }

        let user = self.load(user_key).await?;
        if let Some(user) = &user {
            self.cache.populate(Namespace::User, user_key, user).await;
        }
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let now = now_millis();
        let rows = self
            .executor
            .query_write_once(
                sql::INSERT,
                &[
                    SqlValue::from(new_user.user_key),
                    SqlValue::from(new_user.username),
                    SqlValue::from(new_user.language),
                    SqlValue::from(now),
                ],
            )
            .await?;
        let user: User = require_first(rows, || format!("inserted user {}", new_user.user_key))?;

        self.cache.set_static(Namespace::User, user.user_key, &user).await;
        info!("创建用户: user_key={}", user.user_key);
        Ok(user)
    }

    async fn update(&self, user_key: i64, patch: UserPatch) -> Result<User> {
        if patch.is_empty() {
            return self.get(user_key).await;
        }

        let result = self
            .executor
            .query_write_once(
                sql::UPDATE,
                &[
                    SqlValue::from(user_key),
                    SqlValue::from(patch.username),
                    SqlValue::from(patch.language),
                    SqlValue::from(patch.is_active),
                    SqlValue::from(now_millis()),
                ],
            )
            .await;
        if matches!(result, Err(AppError::QueryTimeout(_))) {
            // 语句可能已经提交，删掉缓存由下次读取回填
            self.cache.invalidate(Namespace::User, user_key).await;
        }
        let rows = result?;
        let user: User = require_first(rows, || format!("user {}", user_key))?;

        self.cache.refresh_static(Namespace::User, user_key, &user).await;
        debug!("更新用户: user_key={}, version={}", user_key, user.version);
        Ok(user)
    }

    async fn delete(&self, user_key: i64) -> Result<()> {
        let result = self
            .executor
            .query_write_once(sql::DELETE, &[SqlValue::from(user_key)])
            .await;

        // 无论行是否存在、语句是否确认提交都清理缓存
        self.cache.invalidate_all(user_key, &Namespace::ALL).await;
        let rows = result?;

        if rows.is_empty() {
            return Err(AppError::not_found(format!("user {}", user_key)));
        }
        info!("删除用户: user_key={}", user_key);
        Ok(())
    }
}
