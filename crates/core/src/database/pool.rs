//! 连接池管理
//!
//! 有界连接池：信号量限制同时借出的连接数，空闲连接放在队列里复用。
//! 健康探测连续失败达到阈值后标记为不健康，此时 `acquire` 直接失败，
//! 直到重连成功。重连按 `base × attempt` 线性退避，超过上限后发出
//! `PoolStatus::Failed` 并停止自动恢复。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use quant_bot_common::{AppError, Result as AppResult};

use super::driver::{Connector, Row, SqlValue, StoreConnection};
use crate::config::PoolConfig;

/// 连接池对外状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Healthy,
    Unhealthy,
    Reconnecting,
    /// 重连次数耗尽，自动恢复已停止
    Failed,
}

/// 连接池状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub min: u32,
    pub max: u32,
    pub active: u32,
    pub idle: u32,
    pub waiting: u32,
    pub healthy: bool,
    pub reconnect_attempts: u32,
    pub consecutive_failures: u32,
    pub generation: u64,
}

struct IdleConnection {
    conn: Box<dyn StoreConnection>,
    generation: u64,
    idle_since: Instant,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    active: AtomicU32,
    waiting: AtomicU32,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    reconnect_attempts: AtomicU32,
    generation: AtomicU64,
    closed: AtomicBool,
    reconnect_lock: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<PoolStatus>,
}

impl PoolInner {
    fn idle_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<IdleConnection>> {
        // 持锁期间不会 panic，中毒时直接取回数据
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: PoolStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn release(&self, conn: Box<dyn StoreConnection>, generation: u64) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if generation != self.generation.load(Ordering::Acquire) {
            debug!("丢弃旧代连接 generation={}", generation);
            return;
        }
        self.idle_queue().push_back(IdleConnection {
            conn,
            generation,
            idle_since: Instant::now(),
        });
    }
}

/// 借出的连接，drop 时归还连接池
///
/// 被标记为损坏的连接、旧代连接和连接池关闭后归还的连接会被直接丢弃
pub struct PooledConnection {
    conn: Option<Box<dyn StoreConnection>>,
    generation: u64,
    broken: bool,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn conn_mut(&mut self) -> AppResult<&mut Box<dyn StoreConnection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::StoreUnavailable("connection already released".into()))
    }

    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        // 语句执行中被取消时连接状态未知，先按损坏处理
        self.broken = true;
        let result = self.conn_mut()?.query(sql, params).await;
        self.broken = matches!(&result, Err(e) if e.is_connection_error());
        result
    }

    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        self.broken = true;
        let result = self.conn_mut()?.execute(sql, params).await;
        self.broken = matches!(&result, Err(e) if e.is_connection_error());
        result
    }

    pub async fn ping(&mut self) -> AppResult<()> {
        self.broken = true;
        let result = self.conn_mut()?.ping().await;
        self.broken = result.is_err();
        result
    }

    /// 标记为损坏，归还时不再放回空闲队列
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::AcqRel);
        if let Some(conn) = self.conn.take() {
            if self.broken {
                debug!("丢弃损坏的连接");
            } else {
                self.pool.release(conn, self.generation);
            }
        }
    }
}

/// 等待计数守卫，获取连接的 future 被取消时也能回退计数
struct WaitGuard<'a>(&'a AtomicU32);

impl<'a> WaitGuard<'a> {
    fn new(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 数据库连接池
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        let (status_tx, _) = watch::channel(PoolStatus::Healthy);
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
                connector,
                config,
                idle: Mutex::new(VecDeque::new()),
                active: AtomicU32::new(0),
                waiting: AtomicU32::new(0),
                healthy: AtomicBool::new(true),
                consecutive_failures: AtomicU32::new(0),
                reconnect_attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                reconnect_lock: tokio::sync::Mutex::new(()),
                status_tx,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// 打开最小连接数
    ///
    /// 存储不可达时把连接池标记为不健康并返回错误，由健康监控负责恢复
    pub async fn initialize(&self) -> AppResult<()> {
        info!(
            "正在初始化数据库连接池: {} (min={}, max={})",
            self.inner.connector.describe(),
            self.inner.config.min_connections,
            self.inner.config.max_connections
        );
        match self.warm_up().await {
            Ok(opened) => {
                info!("✓ 数据库连接池初始化成功，预建连接 {} 个", opened);
                Ok(())
            }
            Err(e) => {
                error!("数据库连接池初始化失败: {}", e);
                self.inner.healthy.store(false, Ordering::Release);
                self.inner.set_status(PoolStatus::Unhealthy);
                Err(e)
            }
        }
    }

    /// 获取连接
    ///
    /// 不健康时立即返回 `StoreUnavailable`；在 `acquire_timeout` 内拿不到连接返回 `PoolTimeout`
    pub async fn acquire(&self) -> AppResult<PooledConnection> {
        if self.is_closed() {
            return Err(AppError::StoreUnavailable("connection pool is closed".into()));
        }
        if !self.is_healthy() {
            return Err(AppError::StoreUnavailable(
                "connection pool is unhealthy, waiting for recovery".into(),
            ));
        }
        self.checkout().await
    }

    async fn checkout(&self) -> AppResult<PooledConnection> {
        let inner = &self.inner;
        let acquire_timeout = inner.config.acquire_timeout;

        let permit = {
            let _waiting = WaitGuard::new(&inner.waiting);
            tokio::time::timeout(acquire_timeout, inner.semaphore.clone().acquire_owned()).await
        };

        let permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(AppError::StoreUnavailable("connection pool is closed".into()));
            }
            Err(_) => {
                warn!(
                    max = inner.config.max_connections,
                    active = inner.active.load(Ordering::Acquire),
                    waiting = inner.waiting.load(Ordering::Acquire),
                    "连接池已满，{:?} 内未获取到连接",
                    acquire_timeout
                );
                return Err(AppError::PoolTimeout(acquire_timeout));
            }
        };

        let generation = inner.generation.load(Ordering::Acquire);
        let conn = match self.take_idle(generation) {
            Some(conn) => conn,
            None => inner.connector.connect().await?,
        };

        inner.active.fetch_add(1, Ordering::AcqRel);
        Ok(PooledConnection {
            conn: Some(conn),
            generation,
            broken: false,
            pool: inner.clone(),
            _permit: permit,
        })
    }

    /// 取出一个可用的空闲连接，顺便丢弃过期和旧代连接
    fn take_idle(&self, generation: u64) -> Option<Box<dyn StoreConnection>> {
        let idle_timeout = self.inner.config.idle_timeout;
        let mut idle = self.inner.idle_queue();
        while let Some(entry) = idle.pop_front() {
            if entry.generation != generation {
                continue;
            }
            if entry.idle_since.elapsed() > idle_timeout {
                debug!("丢弃空闲超时的连接");
                continue;
            }
            return Some(entry.conn);
        }
        None
    }

    /// 补足最小连接数，返回新建的连接数
    async fn warm_up(&self) -> AppResult<usize> {
        let inner = &self.inner;
        let generation = inner.generation.load(Ordering::Acquire);
        let existing = inner.idle_queue().len() as u32 + inner.active.load(Ordering::Acquire);
        let target = inner
            .config
            .min_connections
            .min(inner.config.max_connections)
            .saturating_sub(existing);

        let mut opened = 0;
        for _ in 0..target {
            let conn = inner.connector.connect().await?;
            inner.release(conn, generation);
            opened += 1;
        }
        Ok(opened)
    }

    /// 健康探测：借一条连接执行 `SELECT 1`
    ///
    /// 连接池被占满导致的 `PoolTimeout` 不算失败，返回当前健康标记
    pub async fn health_check(&self) -> bool {
        if self.is_closed() {
            return false;
        }

        let probe_timeout = self.inner.config.probe_timeout;
        let probe = async {
            let mut conn = self.checkout().await?;
            match tokio::time::timeout(probe_timeout, conn.ping()).await {
                Ok(result) => result,
                Err(_) => {
                    conn.mark_broken();
                    Err(AppError::QueryTimeout(probe_timeout))
                }
            }
        };

        match probe.await {
            Ok(()) => {
                self.record_success();
                true
            }
            Err(AppError::PoolTimeout(_)) => {
                debug!("健康检查未拿到连接，跳过本轮");
                self.is_healthy()
            }
            Err(e) => {
                self.record_failure(&e);
                false
            }
        }
    }

    fn record_success(&self) {
        let inner = &self.inner;
        inner.consecutive_failures.store(0, Ordering::Release);
        let attempts = inner.reconnect_attempts.swap(0, Ordering::AcqRel);
        let was_healthy = inner.healthy.swap(true, Ordering::AcqRel);
        inner.set_status(PoolStatus::Healthy);
        if !was_healthy || attempts > 0 {
            info!("✓ 数据库连接已恢复 (重连尝试 {} 次)", attempts);
        }
    }

    fn record_failure(&self, err: &AppError) {
        let inner = &self.inner;
        let failures = inner.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let threshold = inner.config.failure_threshold;
        warn!(
            failures,
            threshold,
            error = %err,
            "数据库健康检查失败"
        );
        if failures >= threshold && inner.healthy.swap(false, Ordering::AcqRel) {
            error!("连续 {} 次失败，连接池标记为不健康", failures);
            inner.set_status(PoolStatus::Unhealthy);
        }
    }

    /// 查询执行器在重试之间调用：连接级错误计入连续失败次数
    pub fn handle_failure(&self, err: &AppError) {
        if err.is_connection_error() {
            self.record_failure(err);
        }
    }

    /// 重建连接池
    ///
    /// 第 n 次尝试前等待 `reconnect_base_delay × n`；尝试次数用尽后发出
    /// `PoolStatus::Failed` 并返回 `StoreUnavailable`，不再继续尝试
    pub async fn reconnect(&self) -> AppResult<()> {
        let _guard = self.inner.reconnect_lock.lock().await;
        let inner = &self.inner;

        if self.is_closed() {
            return Err(AppError::StoreUnavailable("connection pool is closed".into()));
        }
        if self.is_healthy() {
            return Ok(());
        }

        let max_attempts = inner.config.max_reconnect_attempts;
        loop {
            let attempt = inner.reconnect_attempts.load(Ordering::Acquire);
            if attempt >= max_attempts {
                error!(
                    "数据库重连 {} 次均失败，停止自动恢复: {}",
                    attempt,
                    inner.connector.describe()
                );
                inner.set_status(PoolStatus::Failed);
                return Err(AppError::StoreUnavailable(format!(
                    "reconnect gave up after {} attempts",
                    attempt
                )));
            }

            let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
            let delay = inner.config.reconnect_base_delay * attempt;
            inner.set_status(PoolStatus::Reconnecting);
            warn!(
                "数据库重连 第 {}/{} 次，{:?} 后重建连接池",
                attempt, max_attempts, delay
            );
            tokio::time::sleep(delay).await;

            self.teardown();
            if let Err(e) = self.warm_up().await {
                warn!("重连第 {} 次建立连接失败: {}", attempt, e);
            }

            if self.health_check().await {
                return Ok(());
            }
        }
    }

    /// 丢弃所有空闲连接，已借出的旧代连接归还时丢弃
    fn teardown(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let dropped = {
            let mut idle = self.inner.idle_queue();
            let n = idle.len();
            idle.clear();
            n
        };
        debug!("连接池已重置，generation={}，丢弃空闲连接 {} 个", generation, dropped);
    }

    pub fn state(&self) -> PoolState {
        let inner = &self.inner;
        PoolState {
            min: inner.config.min_connections,
            max: inner.config.max_connections,
            active: inner.active.load(Ordering::Acquire),
            idle: inner.idle_queue().len() as u32,
            waiting: inner.waiting.load(Ordering::Acquire),
            healthy: inner.healthy.load(Ordering::Acquire),
            reconnect_attempts: inner.reconnect_attempts.load(Ordering::Acquire),
            consecutive_failures: inner.consecutive_failures.load(Ordering::Acquire),
            generation: inner.generation.load(Ordering::Acquire),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PoolStatus {
        *self.inner.status_tx.borrow()
    }

    /// 订阅状态变化，`Failed` 表示需要人工介入
    pub fn subscribe(&self) -> watch::Receiver<PoolStatus> {
        self.inner.status_tx.subscribe()
    }

    /// 关闭连接池
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("正在关闭数据库连接池...");
        self.inner.semaphore.close();
        self.inner.idle_queue().clear();
        info!("✓ 数据库连接池已关闭");
    }

    /// 启动后台健康监控
    pub fn spawn_health_monitor(&self) -> HealthMonitor {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let pool = self.clone();
        let interval = pool.inner.config.health_check_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("数据库健康监控已启动，间隔 {:?}", interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                if pool.is_closed() {
                    break;
                }

                let step = async {
                    if pool.health_check().await || pool.is_healthy() {
                        return true;
                    }
                    match pool.reconnect().await {
                        Ok(()) => true,
                        Err(_) => pool.status() != PoolStatus::Failed,
                    }
                };

                let keep_running = tokio::select! {
                    keep = step => keep,
                    _ = stop_rx.changed() => false,
                };
                if !keep_running {
                    break;
                }
            }
            info!("数据库健康监控已停止");
        });

        HealthMonitor {
            stop_tx,
            handle: Some(handle),
        }
    }
}

/// 后台健康监控句柄
pub struct HealthMonitor {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// 停止监控并等待任务退出
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("健康监控任务退出异常: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}
