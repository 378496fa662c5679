//! # Quant Bot Core
//!
//! 核心基础设施：配置、连接池、查询执行器、缓存适配器、日志

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod logger;

pub use error::{AppError, AppResult};
