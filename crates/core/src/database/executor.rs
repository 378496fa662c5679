//! 查询执行器
//!
//! 应用代码读写存储的唯一入口：借连接、计时、慢查询日志、超时和重试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

use quant_bot_common::utils::truncate_for_log;
use quant_bot_common::{AppError, Result as AppResult};

use super::driver::{Row, SqlValue};
use super::pool::{ConnectionPool, PooledConnection};
use crate::config::ExecutorConfig;

/// 慢查询日志里语句的最大长度
const LOG_SQL_MAX_LEN: usize = 200;

/// 线性退避：第 k 次重试前等待 base × k
fn linear_backoff(base: Duration, max_retries: usize) -> impl Iterator<Item = Duration> {
    (1..=max_retries as u32).map(move |k| base * k)
}

pub struct QueryExecutor {
    pool: ConnectionPool,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(pool: ConnectionPool, config: ExecutorConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn max_retries(&self) -> usize {
        self.config.max_retries
    }

    /// 执行语句并返回所有行
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        let mut conn = self.pool.acquire().await?;
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.query_timeout, conn.query(sql, params)).await;
        self.settle(&mut conn, sql, started, result)
    }

    /// 执行语句并返回受影响行数
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let started = Instant::now();
        let result =
            tokio::time::timeout(self.config.query_timeout, conn.execute(sql, params)).await;
        self.settle(&mut conn, sql, started, result)
    }

    fn settle<T>(
        &self,
        conn: &mut PooledConnection,
        sql: &str,
        started: Instant,
        result: Result<AppResult<T>, Elapsed>,
    ) -> AppResult<T> {
        let elapsed = started.elapsed();
        let result = match result {
            Ok(result) => result,
            Err(_) => {
                conn.mark_broken();
                Err(AppError::QueryTimeout(self.config.query_timeout))
            }
        };

        if elapsed >= self.config.slow_query_threshold {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.config.slow_query_threshold.as_millis() as u64,
                ok = result.is_ok(),
                "慢查询: {}",
                truncate_for_log(sql, LOG_SQL_MAX_LEN)
            );
        }
        if let Err(e) = &result {
            debug!(
                "语句执行失败 ({:?}): {} | {}",
                elapsed,
                e,
                truncate_for_log(sql, LOG_SQL_MAX_LEN)
            );
        }
        result
    }

    /// 返回第一行，没有结果时返回 `NotFound`
    pub async fn query_one(&self, sql: &str, params: &[SqlValue]) -> AppResult<Row> {
        self.query_opt(sql, params)
            .await?
            .ok_or_else(|| AppError::not_found(truncate_for_log(sql, LOG_SQL_MAX_LEN)))
    }

    pub async fn query_opt(&self, sql: &str, params: &[SqlValue]) -> AppResult<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// 瞬时错误最多重试 `max_retries` 次，永久错误立即返回
    pub async fn query_with_retry(
        &self,
        sql: &str,
        params: &[SqlValue],
        max_retries: usize,
    ) -> AppResult<Vec<Row>> {
        let attempts = AtomicUsize::new(0);
        let attempts_ref = &attempts;

        let result = RetryIf::spawn(
            linear_backoff(self.config.retry_base_delay, max_retries),
            move || async move {
                let attempt = attempts_ref.fetch_add(1, Ordering::AcqRel) + 1;
                let result = self.query(sql, params).await;
                if let Err(e) = &result {
                    if e.is_transient() && attempt <= max_retries {
                        warn!(
                            "查询失败，准备第 {}/{} 次重试: {}",
                            attempt, max_retries, e
                        );
                        self.pool.handle_failure(e);
                    }
                }
                result
            },
            |e: &AppError| e.is_transient(),
        )
        .await;

        if let Err(e) = &result {
            if e.is_transient() {
                self.pool.handle_failure(e);
                error!(
                    "查询在 {} 次尝试后仍失败: {} | {}",
                    attempts.load(Ordering::Acquire),
                    e,
                    truncate_for_log(sql, LOG_SQL_MAX_LEN)
                );
            }
        }
        result
    }

    /// 使用配置的重试次数
    pub async fn query_retrying(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        self.query_with_retry(sql, params, self.config.max_retries)
            .await
    }

    /// 写语句（INSERT / UPDATE / DELETE）：只在 `PoolTimeout` 时重试，语句此时还没到达存储
    ///
    /// `QueryTimeout` 后首次执行可能已经提交，不能再跑一次
    pub async fn query_write_once(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        RetryIf::spawn(
            linear_backoff(self.config.retry_base_delay, self.config.max_retries),
            move || self.query(sql, params),
            |e: &AppError| matches!(e, AppError::PoolTimeout(_)),
        )
        .await
    }
}
