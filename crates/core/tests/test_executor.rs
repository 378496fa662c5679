mod common;

use std::sync::Arc;
use std::time::Duration;

use quant_bot_common::AppError;
use quant_bot_core::config::{ExecutorConfig, PoolConfig};
use quant_bot_core::database::{classify_sqlstate, ConnectionPool, QueryExecutor, SqlValue};
use serde_json::json;

use common::{executor_config, pool_config, FakeConnector, FakeStore};

async fn executor_with(pool: PoolConfig, executor: ExecutorConfig) -> (QueryExecutor, Arc<FakeStore>) {
    let (connector, store) = FakeConnector::new();
    let pool = ConnectionPool::new(connector, pool);
    pool.initialize().await.unwrap();
    (QueryExecutor::new(pool, executor), store)
}

async fn executor() -> (QueryExecutor, Arc<FakeStore>) {
    executor_with(
        PoolConfig {
            failure_threshold: 10,
            ..pool_config()
        },
        executor_config(),
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_failure() {
    let (executor, store) = executor().await;
    store.fail_next([AppError::StoreUnavailable("connection reset".into())]);

    let rows = executor
        .query_with_retry("SELECT $1", &[SqlValue::from(42i64)], 3)
        .await
        .unwrap();

    assert_eq!(rows[0].get("echo"), Some(&json!(42)));
    assert_eq!(store.queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_uses_linear_backoff() {
    let (executor, store) = executor().await;
    store.fail_next([
        AppError::QueryTimeout(Duration::from_secs(10)),
        AppError::QueryTimeout(Duration::from_secs(10)),
    ]);

    let started = tokio::time::Instant::now();
    executor.query_with_retry("SELECT 1", &[], 3).await.unwrap();

    // 200ms + 400ms
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(600));
    assert!(elapsed < Duration::from_millis(700));
    assert_eq!(store.queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_constraint_violation_is_not_retried() {
    let (executor, store) = executor().await;
    store.fail_next([AppError::ConstraintViolation(
        "[23505] duplicate key value violates unique constraint".into(),
    )]);

    let result = executor.query_with_retry("INSERT INTO users", &[], 3).await;

    assert!(matches!(result, Err(AppError::ConstraintViolation(_))));
    assert_eq!(store.queries(), 1);
    assert_eq!(executor.pool().state().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhausted() {
    let (executor, store) = executor().await;
    store.fail_next((0..4).map(|_| AppError::StoreUnavailable("broken pipe".into())));

    let result = executor.query_with_retry("SELECT 1", &[], 3).await;

    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    assert_eq!(store.queries(), 4);
    assert_eq!(executor.pool().state().consecutive_failures, 4);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_connection_errors_mark_pool_unhealthy() {
    let (executor, store) = executor_with(pool_config(), executor_config()).await;
    store.fail_next((0..10).map(|_| AppError::StoreUnavailable("broken pipe".into())));

    let result = executor.query_with_retry("SELECT 1", &[], 3).await;

    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    assert!(!executor.pool().is_healthy());
    // 第三次失败后连接池被标记为不健康，后续重试在借连接时就失败
    assert_eq!(store.queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_query_result_unchanged() {
    let (executor, store) = executor().await;
    store.set_query_delay(Duration::from_millis(1500));

    let rows = executor
        .query("SELECT $1", &[SqlValue::from("slow")])
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("echo"), Some(&json!("slow")));
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout_drops_connection() {
    let (executor, store) = executor().await;
    assert_eq!(executor.pool().state().idle, 1);
    store.set_query_delay(Duration::from_secs(20));

    let result = executor.query("SELECT pg_sleep(20)", &[]).await;

    assert!(matches!(result, Err(AppError::QueryTimeout(_))));
    let state = executor.pool().state();
    assert_eq!(state.idle, 0);
    assert_eq!(state.active, 0);

    store.set_query_delay(Duration::ZERO);
    executor.query("SELECT 1", &[]).await.unwrap();
    assert_eq!(store.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_query_one_not_found() {
    let (executor, _store) = executor().await;

    let result = executor.query_one("SELECT EMPTY", &[]).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let row = executor.query_opt("SELECT EMPTY", &[]).await.unwrap();
    assert!(row.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_insert_not_retried_after_reaching_store() {
    let (executor, store) = executor().await;
    store.fail_next([AppError::StoreUnavailable("connection reset".into())]);

    let result = executor.query_write_once("INSERT INTO users", &[]).await;

    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    assert_eq!(store.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_insert_retried_on_pool_timeout() {
    let (executor, store) = executor().await;
    let held = executor.pool().acquire().await.unwrap();
    let held2 = executor.pool().acquire().await.unwrap();

    let release = async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(held);
        drop(held2);
    };
    let (result, ()) = tokio::join!(executor.query_write_once("INSERT INTO users", &[]), release);

    assert!(result.is_ok());
    assert_eq!(store.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadlocks_retried_without_marking_pool_unhealthy() {
    let (executor, store) = executor_with(pool_config(), executor_config()).await;
    store.fail_next((0..3).map(|_| classify_sqlstate("40P01", "deadlock detected")));

    let rows = executor
        .query_with_retry("UPDATE positions SET amount = $1", &[SqlValue::from(1i64)], 3)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(store.queries(), 4);
    let state = executor.pool().state();
    assert!(state.healthy);
    assert_eq!(state.consecutive_failures, 0);
    // 冲突不会让连接被丢弃
    assert_eq!(store.connects(), 1);
    executor.query("SELECT 1", &[]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_write_not_retried_after_query_timeout() {
    let (executor, store) = executor().await;
    store.set_query_delay(Duration::from_secs(20));

    let result = executor
        .query_write_once("DELETE FROM users WHERE user_key = $1", &[SqlValue::from(42i64)])
        .await;

    assert!(matches!(result, Err(AppError::QueryTimeout(_))));
    assert_eq!(store.queries(), 1);
}
