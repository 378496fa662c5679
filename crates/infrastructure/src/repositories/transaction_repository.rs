//! 交易记录仓储实现
//!
//! transactions 是变化最快的动态命名空间，默认 `Eager`。
//! 记录或更新交易同时删除该用户的持仓缓存

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use quant_bot_common::utils::now_millis;
use quant_bot_common::{AppError, Result};
use quant_bot_core::database::{QueryExecutor, SqlValue};
use quant_bot_domain::traits::TransactionRepository;
use quant_bot_domain::{
    Namespace, NewTransaction, Transaction, TransactionHistory, TransactionPatch, TxStatus,
};

use super::{decode_all, decode_first, require_first};
use crate::cache::{CacheCoordinator, RefreshPolicy};

/// 缓存的最近交易条数
pub const RECENT_LIMIT: i64 = 50;

macro_rules! transaction_columns {
    () => {
        "id, user_key, tx_hash, token_address, side, amount, price, status, created_at, updated_at, version"
    };
}

pub mod sql {
    pub const SELECT_RECENT: &str = concat!(
        "SELECT ",
        transaction_columns!(),
        " FROM transactions WHERE user_key = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
    );

    pub const SELECT_BY_HASH: &str =
        concat!("SELECT ", transaction_columns!(), " FROM transactions WHERE tx_hash = $1");

    pub const INSERT: &str = concat!(
        "INSERT INTO transactions (user_key, tx_hash, token_address, side, amount, price, status, created_at, updated_at, version) ",
        "VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, 1) RETURNING ",
        transaction_columns!()
    );

    pub const UPDATE: &str = concat!(
        "UPDATE transactions SET status = COALESCE($2, status), amount = COALESCE($3, amount), ",
        "price = COALESCE($4, price), updated_at = $5, version = version + 1 ",
        "WHERE id = $1 RETURNING ",
        transaction_columns!()
    );

    pub const DELETE_ALL: &str = "DELETE FROM transactions WHERE user_key = $1 RETURNING id";
}

pub struct CachedTransactionRepository {
    executor: Arc<QueryExecutor>,
    cache: Arc<CacheCoordinator>,
    policy: RefreshPolicy,
}

impl CachedTransactionRepository {
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

    /// 交易会改变持仓，持仓缓存总是立即删除
    async fn after_write(&self, user_key: i64) {
        self.cache
            .apply_policy(Namespace::Transactions, user_key, self.policy)
            .await;
        self.cache.invalidate(Namespace::Portfolio, user_key).await;
    }
}

#[async_trait]
impl TransactionRepository for CachedTransactionRepository {
    async fn get(&self, user_key: i64) -> Result<TransactionHistory> {
        if let Some(history) = self
            .cache
            .get::<TransactionHistory>(Namespace::Transactions, user_key)
            .await
        {
            return Ok(history);
        }

        let read_at = now_millis();
        let rows = self
            .executor
            .query_retrying(
                sql::SELECT_RECENT,
                &[SqlValue::from(user_key), SqlValue::from(RECENT_LIMIT)],
            )
            .await?;
        let history = TransactionHistory::new(user_key, decode_all(rows)?).read_at(read_at);

        self.cache
            .populate(Namespace::Transactions, user_key, &history)
            .await;
        Ok(history)
    }

    async fn find_by_hash(&self, tx_hash: &str) -> Result<Transaction> {
        let rows = self
            .executor
            .query_retrying(sql::SELECT_BY_HASH, &[SqlValue::from(tx_hash)])
            .await?;
        decode_first(rows)?.ok_or_else(|| AppError::not_found(format!("transaction {}", tx_hash)))
    }

    async fn create(&self, new_tx: NewTransaction) -> Result<Transaction> {
        new_tx.validate()?;

        let rows = self
            .executor
            .query_write_once(
                sql::INSERT,
                &[
                    SqlValue::from(new_tx.user_key),
                    SqlValue::from(new_tx.tx_hash.as_str()),
                    SqlValue::from(new_tx.token_address.as_str()),
                    SqlValue::from(new_tx.side.as_str()),
                    SqlValue::from(new_tx.amount),
                    SqlValue::from(new_tx.price),
                    SqlValue::from(TxStatus::Pending.as_str()),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let tx: Transaction = require_first(rows, || format!("inserted transaction {}", new_tx.tx_hash))?;

        self.after_write(tx.user_key).await;
        info!(
            "记录交易: user_key={}, tx_hash={}, side={}",
            tx.user_key, tx.tx_hash, tx.side
        );
        Ok(tx)
    }

    async fn update(&self, id: i64, patch: TransactionPatch) -> Result<Transaction> {
        let rows = self
            .executor
            .query_write_once(
                sql::UPDATE,
                &[
                    SqlValue::from(id),
                    SqlValue::from(patch.status.map(|s| s.as_str())),
                    SqlValue::from(patch.amount),
                    SqlValue::from(patch.price),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let tx: Transaction = require_first(rows, || format!("transaction id {}", id))?;

        self.after_write(tx.user_key).await;
        Ok(tx)
    }

    async fn delete(&self, user_key: i64) -> Result<u64> {
        let rows = self
            .executor
            .query_write_once(sql::DELETE_ALL, &[SqlValue::from(user_key)])
            .await?;
        self.cache
            .invalidate_all(user_key, &[Namespace::Transactions, Namespace::Portfolio])
            .await;
        Ok(rows.len() as u64)
    }
}
