//! Postgres 驱动（sqlx）
//!
//! 负责两件事：把 `SqlValue` 绑定成带类型的参数，把 sqlx 错误按 SQLSTATE
//! 归类到统一错误类型

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Postgres, Row as _, TypeInfo};
use tracing::debug;

use quant_bot_common::{AppError, Result as AppResult};

use super::driver::{Connector, Row, SqlValue, StoreConnection};
use crate::config::DatabaseConfig;

/// Postgres 连接工厂
pub struct PgConnector {
    options: PgConnectOptions,
    connect_timeout: Duration,
    target: String,
}

impl PgConnector {
    pub fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let options = match &config.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| AppError::Config(format!("invalid DATABASE_URL: {}", e)))?,
            None => PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .password(&config.password)
                .database(&config.database),
        };

        // 语句耗时由执行器统一记录
        let options = options
            .application_name("quant_bot")
            .disable_statement_logging();

        Ok(Self {
            options,
            connect_timeout: config.connect_timeout,
            target: config.display_target(),
        })
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            PgConnection::connect_with(&self.options),
        )
        .await
        .map_err(|_| {
            AppError::StoreUnavailable(format!(
                "connect to {} timed out after {:?}",
                self.target, self.connect_timeout
            ))
        })?
        .map_err(classify_error)?;

        debug!("opened store connection to {}", self.target);
        Ok(Box::new(PgStoreConnection { conn }))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

/// 单条 Postgres 连接
pub struct PgStoreConnection {
    conn: PgConnection,
}

fn bind_params<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::I64(v) => query.bind(*v),
            SqlValue::F64(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> AppResult<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = match type_name {
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| v.map(Value::from)),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map(Value::from)),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map(Value::from)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .map(|v| v.map(|f| Value::from(f as f64))),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| v.map(Value::from)),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map(Value::from)),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map(Value::from)),
        }
        .map_err(|e| {
            AppError::Query(format!(
                "cannot decode column {} ({}): {}",
                column.name(),
                type_name,
                e
            ))
        })?;
        out.insert(column.name(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

#[async_trait]
impl StoreConnection for PgStoreConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        let rows = bind_params(sql, params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(classify_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        let result = bind_params(sql, params)
            .execute(&mut self.conn)
            .await
            .map_err(classify_error)?;
        Ok(result.rows_affected())
    }

    async fn ping(&mut self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&mut self.conn)
            .await
            .map_err(classify_error)?;
        Ok(())
    }
}

/// 把 sqlx 错误归类为统一错误
pub fn classify_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            classify_sqlstate(&code, db_err.message())
        }
        sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
        sqlx::Error::Io(e) => AppError::StoreUnavailable(format!("io: {}", e)),
        sqlx::Error::Tls(e) => AppError::StoreUnavailable(format!("tls: {}", e)),
        sqlx::Error::Protocol(msg) => AppError::StoreUnavailable(format!("protocol: {}", msg)),
        sqlx::Error::PoolTimedOut => AppError::StoreUnavailable("driver pool timed out".into()),
        sqlx::Error::PoolClosed => AppError::StoreUnavailable("driver pool closed".into()),
        sqlx::Error::WorkerCrashed => AppError::StoreUnavailable("driver worker crashed".into()),
        sqlx::Error::Configuration(e) => AppError::Config(e.to_string()),
        other => AppError::Query(other.to_string()),
    }
}

/// 按 SQLSTATE 分类
///
/// 23xxx 约束冲突；08xxx 连接异常、57P01-57P03 服务端关闭、53300 连接数耗尽
/// 视为存储不可用；40001/40P01 序列化失败与死锁是事务冲突，可重试但不计入健康失败
pub fn classify_sqlstate(code: &str, message: &str) -> AppError {
    let detail = if code.is_empty() {
        message.to_string()
    } else {
        format!("[{}] {}", code, message)
    };

    if code.starts_with("23") {
        return AppError::ConstraintViolation(detail);
    }
    if code.starts_with("08") {
        return AppError::StoreUnavailable(detail);
    }
    match code {
        "57P01" | "57P02" | "57P03" | "53300" => AppError::StoreUnavailable(detail),
        "40001" | "40P01" => AppError::Conflict(detail),
        _ => AppError::Query(detail),
    }
}
