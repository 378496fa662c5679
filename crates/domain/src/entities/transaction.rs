//! 交易记录

use serde::{Deserialize, Serialize};

use quant_bot_common::{AppError, Result};

use super::Versioned;
use crate::enums::{TradeSide, TxStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_key: i64,
    pub tx_hash: String,
    pub token_address: String,
    pub side: TradeSide,
    pub amount: f64,
    pub price: f64,
    pub status: TxStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

/// 用户最近的交易记录，缓存在 transactions 命名空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub user_key: i64,
    /// 按创建时间倒序
    pub transactions: Vec<Transaction>,
    /// 快照版本，同 `Portfolio::version`
    pub version: i64,
}

impl TransactionHistory {
    pub fn new(user_key: i64, transactions: Vec<Transaction>) -> Self {
        let version = transactions.iter().map(|t| t.updated_at).max().unwrap_or(0);
        Self {
            user_key,
            transactions,
            version,
        }
    }

    /// 以读取开始时间作为快照版本的下界
    pub fn read_at(mut self, read_at_ms: i64) -> Self {
        self.version = self.version.max(read_at_ms);
        self
    }

    pub fn pending(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .iter()
            .filter(|t| t.status == TxStatus::Pending)
    }
}

impl Versioned for TransactionHistory {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_key: i64,
    pub tx_hash: String,
    pub token_address: String,
    pub side: TradeSide,
    pub amount: f64,
    pub price: f64,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.tx_hash.trim().is_empty() {
            return Err(AppError::Validation("tx_hash is empty".into()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AppError::Validation(format!("invalid amount: {}", self.amount)));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::Validation(format!("invalid price: {}", self.price)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub status: Option<TxStatus>,
    pub amount: Option<f64>,
    pub price: Option<f64>,
}

impl TransactionPatch {
    pub fn status(status: TxStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
