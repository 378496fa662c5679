//! # Quant Bot Infrastructure
//!
//! 基础设施层 - 实现领域层定义的仓储接口
//!
//! ## 职责
//!
//! 1. **数据访问**: 经 `QueryExecutor` 读写 Postgres
//! 2. **缓存协调**: 命名空间、TTL、版本检查与刷新策略
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use quant_bot_infrastructure::repositories::CachedUserRepository;
//! use quant_bot_domain::traits::UserRepository;
//!
//! let repo = CachedUserRepository::new(executor, coordinator);
//! let user = repo.get(42).await?;
//! ```

pub mod cache;
pub mod repositories;

pub use cache::{CacheCoordinator, RefreshPolicy};
pub use repositories::{
    ensure_schema, CachedPortfolioRepository, CachedSettingsRepository, CachedStateRepository,
    CachedTransactionRepository, CachedUserRepository,
};
