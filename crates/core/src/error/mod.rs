//! 错误处理模块
//!
//! 存储层统一使用 `quant_bot_common::AppError`，这里只做重新导出，
//! 二进制入口和关闭回调使用 `anyhow`

pub use anyhow::{anyhow, Error as AnyhowError};
pub use quant_bot_common::errors::{AppError, Result as AppResult};
