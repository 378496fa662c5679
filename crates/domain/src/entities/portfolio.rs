//! 持仓与持仓聚合

use serde::{Deserialize, Serialize};

use quant_bot_common::{AppError, Result};

use super::Versioned;

/// 单个代币持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub user_key: i64,
    pub token_address: String,
    pub symbol: String,
    pub amount: f64,
    /// 平均买入价
    pub avg_price: f64,
    pub updated_at: i64,
    pub version: i64,
}

impl Position {
    /// 按平均价估算的持仓价值
    pub fn cost_basis(&self) -> f64 {
        self.amount * self.avg_price
    }
}

/// 用户全部持仓，缓存在 portfolio 命名空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_key: i64,
    pub positions: Vec<Position>,
    /// 快照版本：读取开始时间与最新 `updated_at` 取大者，删除持仓后也不会变小
    pub version: i64,
}

impl Portfolio {
    pub fn from_positions(user_key: i64, positions: Vec<Position>) -> Self {
        let version = positions.iter().map(|p| p.updated_at).max().unwrap_or(0);
        Self {
            user_key,
            positions,
            version,
        }
    }

    /// 以读取开始时间作为快照版本的下界
    pub fn read_at(mut self, read_at_ms: i64) -> Self {
        self.version = self.version.max(read_at_ms);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, token_address: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.token_address.eq_ignore_ascii_case(token_address))
    }

    pub fn total_cost_basis(&self) -> f64 {
        self.positions.iter().map(Position::cost_basis).sum()
    }
}

impl Versioned for Portfolio {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub user_key: i64,
    pub token_address: String,
    pub symbol: String,
    pub amount: f64,
    pub avg_price: f64,
}

impl NewPosition {
    pub fn validate(&self) -> Result<()> {
        if self.token_address.trim().is_empty() {
            return Err(AppError::Validation("token_address is empty".into()));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(AppError::Validation(format!("invalid amount: {}", self.amount)));
        }
        if !self.avg_price.is_finite() || self.avg_price < 0.0 {
            return Err(AppError::Validation(format!(
                "invalid avg_price: {}",
                self.avg_price
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionPatch {
    pub amount: Option<f64>,
    pub avg_price: Option<f64>,
}
