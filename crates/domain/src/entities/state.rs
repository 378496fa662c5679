//! 会话状态（菜单流程中的临时数据）

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Versioned;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: i64,
    pub user_key: i64,
    /// 当前所处的菜单步骤，例如 `awaiting_token_address`
    pub state: String,
    pub payload: Value,
    pub updated_at: i64,
    pub version: i64,
}

impl Versioned for ConversationState {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConversationState {
    pub user_key: i64,
    pub state: String,
    pub payload: Value,
}

impl NewConversationState {
    pub fn new(user_key: i64, state: impl Into<String>) -> Self {
        Self {
            user_key,
            state: state.into(),
            payload: Value::Object(Default::default()),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub state: Option<String>,
    pub payload: Option<Value>,
}
