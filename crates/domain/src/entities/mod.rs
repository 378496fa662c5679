//! 业务实体模块
//!
//! 实体一旦读入缓存就是不可变快照，修改只会产生新的快照

pub mod portfolio;
pub mod settings;
pub mod state;
pub mod transaction;
pub mod user;

pub use portfolio::{NewPosition, Portfolio, Position, PositionPatch};
pub use settings::{NewSettings, Settings, SettingsPatch};
pub use state::{ConversationState, NewConversationState, StatePatch};
pub use transaction::{NewTransaction, Transaction, TransactionHistory, TransactionPatch};
pub use user::{NewUser, User, UserPatch};

/// 带版本戳的实体
///
/// 每次 UPDATE 都会递增行上的 `version`，缓存回填时用它丢弃过期的值
pub trait Versioned {
    fn version(&self) -> i64;
}
