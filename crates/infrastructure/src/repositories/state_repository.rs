//! 会话状态仓储实现

use std::sync::Arc;

use async_trait::async_trait;

use quant_bot_common::utils::now_millis;
use quant_bot_common::{AppError, Result};
use quant_bot_core::database::{QueryExecutor, SqlValue};
use quant_bot_domain::traits::StateRepository;
use quant_bot_domain::{ConversationState, Namespace, NewConversationState, StatePatch};

use super::{decode_first, require_first};
use crate::cache::{CacheCoordinator, RefreshPolicy};

macro_rules! state_columns {
    () => {
        "id, user_key, state, payload, updated_at, version"
    };
}

pub mod sql {
    pub const SELECT_BY_KEY: &str = concat!(
        "SELECT ",
        state_columns!(),
        " FROM conversation_states WHERE user_key = $1"
    );

    pub const INSERT: &str = concat!(
        "INSERT INTO conversation_states (user_key, state, payload, updated_at, version) ",
        "VALUES ($1, $2, $3, $4, 1) RETURNING ",
        state_columns!()
    );

    pub const UPSERT: &str = concat!(
        "INSERT INTO conversation_states (user_key, state, payload, updated_at, version) ",
        "VALUES ($1, $2, $3, $4, 1) ",
        "ON CONFLICT (user_key) DO UPDATE SET state = EXCLUDED.state, payload = EXCLUDED.payload, ",
        "updated_at = EXCLUDED.updated_at, version = conversation_states.version + 1 RETURNING ",
        state_columns!()
    );

    pub const UPDATE: &str = concat!(
        "UPDATE conversation_states SET state = COALESCE($2, state), payload = COALESCE($3, payload), ",
        "updated_at = $4, version = version + 1 WHERE user_key = $1 RETURNING ",
        state_columns!()
    );

    pub const DELETE: &str = "DELETE FROM conversation_states WHERE user_key = $1 RETURNING id";
}

pub struct CachedStateRepository {
    executor: Arc<QueryExecutor>,
    cache: Arc<CacheCoordinator>,
    policy: RefreshPolicy,
}

impl CachedStateRepository {
    pub fn new(executor: Arc<QueryExecutor>, cache: Arc<CacheCoordinator>) -> Self {
        Self {
            executor,
            cache,
            policy: RefreshPolicy::Eager,
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn write(&self, sql: &str, new_state: NewConversationState) -> Result<ConversationState> {
        let rows = self
            .executor
            .query_write_once(
                sql,
                &[
                    SqlValue::from(new_state.user_key),
                    SqlValue::from(new_state.state),
                    SqlValue::from(new_state.payload),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let state: ConversationState =
            require_first(rows, || format!("state {}", new_state.user_key))?;

        self.cache
            .apply_policy(Namespace::State, state.user_key, self.policy)
            .await;
        Ok(state)
    }
}

#[async_trait]
impl StateRepository for CachedStateRepository {
    async fn get(&self, user_key: i64) -> Result<ConversationState> {
        if let Some(state) = self
            .cache
            .get::<ConversationState>(Namespace::State, user_key)
            .await
        {
            return Ok(state);
        }

        let rows = self
            .executor
            .query_retrying(sql::SELECT_BY_KEY, &[SqlValue::from(user_key)])
            .await?;
        let state: ConversationState = decode_first(rows)?
            .ok_or_else(|| AppError::not_found(format!("state {}", user_key)))?;

        self.cache.populate(Namespace::State, user_key, &state).await;
        Ok(state)
    }

    async fn create(&self, new_state: NewConversationState) -> Result<ConversationState> {
        self.write(sql::INSERT, new_state).await
    }

    async fn set(&self, new_state: NewConversationState) -> Result<ConversationState> {
        self.write(sql::UPSERT, new_state).await
    }

    async fn update(&self, user_key: i64, patch: StatePatch) -> Result<ConversationState> {
        let rows = self
            .executor
            .query_write_once(
                sql::UPDATE,
                &[
                    SqlValue::from(user_key),
                    SqlValue::from(patch.state),
                    SqlValue::from(patch.payload),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let state: ConversationState = require_first(rows, || format!("state {}", user_key))?;

        self.cache
            .apply_policy(Namespace::State, user_key, self.policy)
            .await;
        Ok(state)
    }

    async fn delete(&self, user_key: i64) -> Result<()> {
        let rows = self
            .executor
            .query_write_once(sql::DELETE, &[SqlValue::from(user_key)])
            .await?;
        self.cache.invalidate(Namespace::State, user_key).await;

        if rows.is_empty() {
            return Err(AppError::not_found(format!("state {}", user_key)));
        }
        Ok(())
    }
}
