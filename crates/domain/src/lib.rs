//! # Quant Bot Domain
//!
//! 领域模型层 - 不依赖任何基础设施
//!
//! ## 模块组织
//!
//! - `entities`: 业务实体，如 User, Settings, Portfolio
//! - `enums`: 业务枚举与缓存命名空间归属
//! - `traits`: 仓储接口，由基础设施层实现

pub mod entities;
pub mod enums;
pub mod traits;

// 重新导出核心类型
pub use entities::{
    ConversationState, NewConversationState, NewPosition, NewSettings, NewTransaction, NewUser,
    Portfolio, Position, PositionPatch, Settings, SettingsPatch, StatePatch, Transaction,
    TransactionHistory, TransactionPatch, User, UserPatch, Versioned,
};
pub use enums::{CacheClass, GasPriority, Namespace, TradeSide, TxStatus};
pub use traits::{
    PortfolioRepository, SettingsRepository, StateRepository, TransactionRepository,
    UserRepository,
};
