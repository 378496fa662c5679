//! 业务枚举模块

pub mod namespace;
pub mod trade_enums;

pub use namespace::{CacheClass, Namespace};
pub use trade_enums::{GasPriority, TradeSide, TxStatus};
