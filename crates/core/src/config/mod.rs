//! 配置管理模块

pub mod cache;
pub mod db;
pub mod environment;
pub mod shutdown_manager;

// 重新导出
pub use cache::{CacheConfig, TtlConfig};
pub use db::{DatabaseConfig, ExecutorConfig, PoolConfig};
pub use environment::*;
pub use shutdown_manager::{ShutdownConfig, ShutdownManager};

use quant_bot_common::Result;

/// 应用整体配置，启动时从环境变量加载一次后注入各组件
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: String,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            app_env: env_or_default("APP_ENV", "local"),
            database: DatabaseConfig::from_env()?,
            cache: CacheConfig::from_env(),
        })
    }

    pub fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("local")
    }
}
