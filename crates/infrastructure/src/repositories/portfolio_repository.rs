//! 持仓仓储实现
//!
//! portfolio 是动态命名空间，缓存整个持仓聚合。默认 `Lazy`：修改持仓不动缓存，
//! 读到的聚合最多落后一个 TTL

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use quant_bot_common::utils::now_millis;
use quant_bot_common::{AppError, Result};
use quant_bot_core::database::{QueryExecutor, SqlValue};
use quant_bot_domain::traits::PortfolioRepository;
use quant_bot_domain::{Namespace, NewPosition, Portfolio, Position, PositionPatch};

use super::{decode_all, require_first};
use crate::cache::{CacheCoordinator, RefreshPolicy};

macro_rules! position_columns {
    () => {
        "id, user_key, token_address, symbol, amount, avg_price, updated_at, version"
    };
}

pub mod sql {
    pub const SELECT_BY_USER: &str = concat!(
        "SELECT ",
        position_columns!(),
        " FROM positions WHERE user_key = $1 ORDER BY token_address"
    );

    pub const INSERT: &str = concat!(
        "INSERT INTO positions (user_key, token_address, symbol, amount, avg_price, updated_at, version) ",
        "VALUES ($1, $2, $3, $4, $5, $6, 1) RETURNING ",
        position_columns!()
    );

    pub const UPDATE: &str = concat!(
        "UPDATE positions SET amount = COALESCE($3, amount), avg_price = COALESCE($4, avg_price), ",
        "updated_at = $5, version = version + 1 ",
        "WHERE user_key = $1 AND token_address = $2 RETURNING ",
        position_columns!()
    );

    pub const DELETE_ONE: &str =
        "DELETE FROM positions WHERE user_key = $1 AND token_address = $2 RETURNING id";

    pub const DELETE_ALL: &str = "DELETE FROM positions WHERE user_key = $1 RETURNING id";
}

pub struct CachedPortfolioRepository {
    executor: Arc<QueryExecutor>,
    cache: Arc<CacheCoordinator>,
    policy: RefreshPolicy,
}

impl CachedPortfolioRepository {
    pub fn new(executor: Arc<QueryExecutor>, cache: Arc<CacheCoordinator>) -> Self {
        Self {
            executor,
            cache,
            policy: RefreshPolicy::Lazy,
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl PortfolioRepository for CachedPortfolioRepository {
    async fn get(&self, user_key: i64) -> Result<Portfolio> {
        if let Some(portfolio) = self.cache.get::<Portfolio>(Namespace::Portfolio, user_key).await {
            return Ok(portfolio);
        }

        let read_at = now_millis();
        let rows = self
            .executor
            .query_retrying(sql::SELECT_BY_USER, &[SqlValue::from(user_key)])
            .await?;
        let portfolio = Portfolio::from_positions(user_key, decode_all(rows)?).read_at(read_at);

        self.cache
            .populate(Namespace::Portfolio, user_key, &portfolio)
            .await;
        Ok(portfolio)
    }

    async fn create(&self, new_position: NewPosition) -> Result<Position> {
        new_position.validate()?;

        let rows = self
            .executor
            .query_write_once(
                sql::INSERT,
                &[
                    SqlValue::from(new_position.user_key),
                    SqlValue::from(new_position.token_address.as_str()),
                    SqlValue::from(new_position.symbol.as_str()),
                    SqlValue::from(new_position.amount),
                    SqlValue::from(new_position.avg_price),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let position: Position = require_first(rows, || {
            format!(
                "inserted position {}/{}",
                new_position.user_key, new_position.token_address
            )
        })?;

        self.cache
            .apply_policy(Namespace::Portfolio, position.user_key, self.policy)
            .await;
        Ok(position)
    }

    async fn update(
        &self,
        user_key: i64,
        token_address: &str,
        patch: PositionPatch,
    ) -> Result<Position> {
        let rows = self
            .executor
            .query_write_once(
                sql::UPDATE,
                &[
                    SqlValue::from(user_key),
                    SqlValue::from(token_address),
                    SqlValue::from(patch.amount),
                    SqlValue::from(patch.avg_price),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let position: Position =
            require_first(rows, || format!("position {}/{}", user_key, token_address))?;

        self.cache
            .apply_policy(Namespace::Portfolio, user_key, self.policy)
            .await;
        debug!(
            "更新持仓: user_key={}, token={}, amount={}",
            user_key, token_address, position.amount
        );
        Ok(position)
    }

    async fn remove(&self, user_key: i64, token_address: &str) -> Result<()> {
        let rows = self
            .executor
            .query_write_once(
                sql::DELETE_ONE,
                &[SqlValue::from(user_key), SqlValue::from(token_address)],
            )
            .await?;
        if rows.is_empty() {
            return Err(AppError::not_found(format!(
                "position {}/{}",
                user_key, token_address
            )));
        }
        self.cache
            .apply_policy(Namespace::Portfolio, user_key, self.policy)
            .await;
        Ok(())
    }

    async fn delete(&self, user_key: i64) -> Result<u64> {
        let rows = self
            .executor
            .query_write_once(sql::DELETE_ALL, &[SqlValue::from(user_key)])
            .await?;
        self.cache.invalidate(Namespace::Portfolio, user_key).await;
        Ok(rows.len() as u64)
    }
}
