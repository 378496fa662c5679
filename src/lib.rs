//! # Quant Bot
//!
//! 交易机器人的持久化与缓存层：连接池、查询执行器、缓存协调和五个仓储，
//! 由 `DataLayer` 统一组装后注入上层

pub mod app;

pub use app::bootstrap::{DataLayer, HealthReport};
pub use quant_bot_core::config::AppConfig;
