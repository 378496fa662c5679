//! 统一错误类型定义
//!
//! 存储层错误在这里统一分类，`is_transient` 是重试逻辑唯一的判断依据：
//! 只有瞬时错误（连接池超时、存储不可用、查询超时、事务冲突）才允许重试，
//! 约束冲突、语法错误等永久错误直接返回给调用方。

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// 在截止时间内没有拿到连接，可重试
    #[error("pool timeout: no connection available within {0:?}")]
    PoolTimeout(Duration),

    /// 连接丢失、连接池不健康或自动恢复已停止
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// 单条语句执行超时，连接已被丢弃
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// 序列化失败或死锁，事务被回滚；可重试，但连接本身是好的
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// 语句被存储拒绝（语法、权限等），不重试
    #[error("query error: {0}")]
    Query(String),

    /// 唯一键 / 外键 / 非空 / check 约束冲突，不重试
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 实体字段校验失败
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// 瞬时错误：重试可能成功
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::PoolTimeout(_)
                | AppError::StoreUnavailable(_)
                | AppError::QueryTimeout(_)
                | AppError::Conflict(_)
        )
    }

    /// 连接级错误：说明底层连接已经不可用，不能再放回连接池
    pub fn is_connection_error(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_) | AppError::QueryTimeout(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}
