//! 仓储接口 - 定义数据访问的抽象
//!
//! 上层只通过这些接口读写实体，缓存和重试对调用方透明。
//! 错误统一使用 `AppError`：`NotFound`、`ConstraintViolation` 不重试，
//! `PoolTimeout` / `StoreUnavailable` 在重试预算用尽后返回

use async_trait::async_trait;

use quant_bot_common::Result;

use crate::entities::{
    ConversationState, NewConversationState, NewPosition, NewSettings, NewTransaction, NewUser,
    Portfolio, Position, PositionPatch, Settings, SettingsPatch, StatePatch, Transaction,
    TransactionHistory, TransactionPatch, User, UserPatch,
};

/// 用户仓储接口
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, user_key: i64) -> Result<User>;

    /// 不存在时返回 `None` 而不是 `NotFound`
    async fn find(&self, user_key: i64) -> Result<Option<User>>;

    async fn create(&self, new_user: NewUser) -> Result<User>;

    async fn update(&self, user_key: i64, patch: UserPatch) -> Result<User>;

    /// 删除用户，级联删除其所有数据并清理全部命名空间的缓存
    async fn delete(&self, user_key: i64) -> Result<()>;
}

/// 交易设置仓储接口
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, user_key: i64) -> Result<Settings>;

    async fn create(&self, new_settings: NewSettings) -> Result<Settings>;

    async fn update(&self, user_key: i64, patch: SettingsPatch) -> Result<Settings>;

    async fn delete(&self, user_key: i64) -> Result<()>;
}

/// 持仓仓储接口
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    /// 用户全部持仓，没有持仓时返回空聚合
    async fn get(&self, user_key: i64) -> Result<Portfolio>;

    async fn create(&self, new_position: NewPosition) -> Result<Position>;

    async fn update(
        &self,
        user_key: i64,
        token_address: &str,
        patch: PositionPatch,
    ) -> Result<Position>;

    async fn remove(&self, user_key: i64, token_address: &str) -> Result<()>;

    /// 删除用户全部持仓，返回删除的行数
    async fn delete(&self, user_key: i64) -> Result<u64>;
}

/// 交易记录仓储接口
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// 用户最近的交易记录
    async fn get(&self, user_key: i64) -> Result<TransactionHistory>;

    async fn find_by_hash(&self, tx_hash: &str) -> Result<Transaction>;

    async fn create(&self, new_tx: NewTransaction) -> Result<Transaction>;

    async fn update(&self, id: i64, patch: TransactionPatch) -> Result<Transaction>;

    async fn delete(&self, user_key: i64) -> Result<u64>;
}

/// 会话状态仓储接口
#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn get(&self, user_key: i64) -> Result<ConversationState>;

    async fn create(&self, new_state: NewConversationState) -> Result<ConversationState>;

    /// 不存在则插入，存在则覆盖
    async fn set(&self, new_state: NewConversationState) -> Result<ConversationState>;

    async fn update(&self, user_key: i64, patch: StatePatch) -> Result<ConversationState>;

    async fn delete(&self, user_key: i64) -> Result<()>;
}
