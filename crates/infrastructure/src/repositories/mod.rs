//! 数据访问层模块
//!
//! 实现 domain 层定义的 Repository 接口。每个仓储先查缓存，未命中再经
//! `QueryExecutor` 读库并回填；写入后按命名空间的刷新策略处理缓存

pub mod portfolio_repository;
pub mod schema;
pub mod settings_repository;
pub mod state_repository;
pub mod transaction_repository;
pub mod user_repository;

pub use portfolio_repository::CachedPortfolioRepository;
pub use schema::ensure_schema;
pub use settings_repository::CachedSettingsRepository;
pub use state_repository::CachedStateRepository;
pub use transaction_repository::CachedTransactionRepository;
pub use user_repository::CachedUserRepository;

use serde::de::DeserializeOwned;

use quant_bot_common::{AppError, Result};
use quant_bot_core::database::Row;

/// 解码第一行，没有结果时返回 `None`
pub(crate) fn decode_first<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Option<T>> {
    rows.into_iter().next().map(|row| row.decode()).transpose()
}

/// 解码第一行，没有结果时返回 `NotFound`
pub(crate) fn require_first<T: DeserializeOwned>(
    rows: Vec<Row>,
    what: impl FnOnce() -> String,
) -> Result<T> {
    decode_first(rows)?.ok_or_else(|| AppError::not_found(what()))
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.iter().map(Row::decode).collect()
}
