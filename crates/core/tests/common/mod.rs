//! 测试用的假存储驱动

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quant_bot_common::{AppError, Result as AppResult};
use quant_bot_core::config::{ExecutorConfig, PoolConfig};
use quant_bot_core::database::{Connector, Row, SqlValue, StoreConnection};

/// 所有假连接共享的开关和计数器
#[derive(Default)]
pub struct FakeStore {
    pub connect_fails: AtomicBool,
    pub ping_fails: AtomicBool,
    pub query_delay_ms: AtomicU64,
    pub connects: AtomicUsize,
    pub queries: AtomicUsize,
    pub pings: AtomicUsize,
    /// 依次弹出，作为下一条语句的错误
    pub scripted_errors: Mutex<VecDeque<AppError>>,
}

impl FakeStore {
    pub fn fail_next(&self, errors: impl IntoIterator<Item = AppError>) {
        self.scripted_errors.lock().unwrap().extend(errors);
    }

    pub fn set_ping_fails(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_connect_fails(&self, fails: bool) {
        self.connect_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    pub store: Arc<FakeStore>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, Arc<FakeStore>) {
        let store = Arc::new(FakeStore::default());
        (
            Arc::new(Self {
                store: store.clone(),
            }),
            store,
        )
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>> {
        if self.store.connect_fails.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("connection refused".into()));
        }
        self.store.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            store: self.store.clone(),
        }))
    }

    fn describe(&self) -> String {
        "fake://store".to_string()
    }
}

struct FakeConnection {
    store: Arc<FakeStore>,
}

impl FakeConnection {
    async fn run(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        self.store.queries.fetch_add(1, Ordering::SeqCst);
        let delay = self.store.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(err) = self.store.scripted_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if sql.contains("EMPTY") {
            return Ok(Vec::new());
        }
        // 把第一个参数原样返回，便于断言结果没有被改动
        let echo = params.first().map(SqlValue::to_json).unwrap_or_default();
        Ok(vec![Row::new().with("n", 1).with("echo", echo)])
    }
}

#[async_trait]
impl StoreConnection for FakeConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        self.run(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        self.run(sql, params).await.map(|rows| rows.len() as u64)
    }

    async fn ping(&mut self) -> AppResult<()> {
        self.store.pings.fetch_add(1, Ordering::SeqCst);
        if self.store.ping_fails.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("server closed the connection".into()));
        }
        Ok(())
    }
}

pub fn pool_config() -> PoolConfig {
    PoolConfig {
        min_connections: 1,
        max_connections: 2,
        acquire_timeout: Duration::from_millis(100),
        idle_timeout: Duration::from_secs(600),
        probe_timeout: Duration::from_secs(1),
        health_check_interval: Duration::from_secs(30),
        failure_threshold: 3,
        max_reconnect_attempts: 3,
        reconnect_base_delay: Duration::from_millis(1000),
    }
}

pub fn executor_config() -> ExecutorConfig {
    ExecutorConfig {
        query_timeout: Duration::from_secs(10),
        slow_query_threshold: Duration::from_millis(1000),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(200),
    }
}
