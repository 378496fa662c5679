//! 用户实体

use serde::{Deserialize, Serialize};

use super::Versioned;

/// 聊天账号对应的用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// 聊天账号 ID，对外的稳定键
    pub user_key: i64,
    pub username: Option<String>,
    pub language: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

impl Versioned for User {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub user_key: i64,
    pub username: Option<String>,
    pub language: String,
}

impl NewUser {
    pub fn new(user_key: i64) -> Self {
        Self {
            user_key,
            username: None,
            language: "en".to_string(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// 部分更新，`None` 表示保持原值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub language: Option<String>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.language.is_none() && self.is_active.is_none()
    }
}
