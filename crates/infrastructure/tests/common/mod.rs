//! 测试用的内存数据库驱动
//!
//! 按仓储里的 SQL 常量分发语句，用内存表模拟 Postgres 的唯一约束、
//! 外键和级联删除

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use quant_bot_common::{AppError, Result as AppResult};
use quant_bot_core::cache::{CacheAdapter, CacheStore, InMemoryCacheStore};
use quant_bot_core::config::{ExecutorConfig, PoolConfig, TtlConfig};
use quant_bot_core::database::{ConnectionPool, Connector, QueryExecutor, Row, SqlValue, StoreConnection};
use quant_bot_infrastructure::repositories::{
    portfolio_repository, schema, settings_repository, state_repository, transaction_repository,
    user_repository,
};
use quant_bot_infrastructure::CacheCoordinator;

type Record = Map<String, Value>;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<Record>,
    settings: Vec<Record>,
    positions: Vec<Record>,
    transactions: Vec<Record>,
    states: Vec<Record>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_exists(&self, user_key: i64) -> bool {
        self.users.iter().any(|r| int(r, "user_key") == user_key)
    }

    fn require_user(&self, user_key: i64, table: &str) -> AppResult<()> {
        if self.user_exists(user_key) {
            Ok(())
        } else {
            Err(AppError::ConstraintViolation(format!(
                "[23503] insert or update on table \"{}\" violates foreign key constraint",
                table
            )))
        }
    }
}

fn int(record: &Record, column: &str) -> i64 {
    record.get(column).and_then(Value::as_i64).unwrap_or_default()
}

fn text<'a>(record: &'a Record, column: &str) -> &'a str {
    record.get(column).and_then(Value::as_str).unwrap_or_default()
}

fn duplicate(constraint: &str) -> AppError {
    AppError::ConstraintViolation(format!(
        "[23505] duplicate key value violates unique constraint \"{}\"",
        constraint
    ))
}

/// `COALESCE($n, column)`：非空参数才覆盖
fn coalesce(record: &mut Record, column: &str, param: &SqlValue) {
    if !param.is_null() {
        record.insert(column.to_string(), param.to_json());
    }
}

fn bump(record: &mut Record, updated_at: &SqlValue) {
    record.insert("updated_at".to_string(), updated_at.to_json());
    let version = int(record, "version") + 1;
    record.insert("version".to_string(), Value::from(version));
}

fn record(pairs: Vec<(&str, Value)>) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn rows(records: impl IntoIterator<Item = Record>) -> Vec<Row> {
    records.into_iter().map(Row::from).collect()
}

fn id_rows(removed: Vec<Record>) -> Vec<Row> {
    removed
        .into_iter()
        .map(|r| Row::new().with("id", int(&r, "id")))
        .collect()
}

/// 删除满足条件的记录并返回它们
fn remove_where(table: &mut Vec<Record>, pred: impl Fn(&Record) -> bool) -> Vec<Record> {
    let (removed, kept): (Vec<_>, Vec<_>) = table.drain(..).partition(|r| pred(r));
    *table = kept;
    removed
}

#[derive(Default)]
pub struct FakeDb {
    tables: Mutex<Tables>,
    pub statements: AtomicUsize,
    pub selects: AtomicUsize,
    pub scripted_errors: Mutex<VecDeque<AppError>>,
    /// 语句照常执行，但回复在途中丢失
    pub lost_replies: AtomicUsize,
}

impl FakeDb {
    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.selects.store(0, Ordering::SeqCst);
        self.statements.store(0, Ordering::SeqCst);
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = AppError>) {
        self.scripted_errors.lock().unwrap().extend(errors);
    }

    /// 下一条语句提交后返回 `QueryTimeout`
    pub fn lose_next_reply(&self) {
        self.lost_replies.fetch_add(1, Ordering::SeqCst);
    }

    fn take_lost_reply(&self) -> bool {
        self.lost_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap();
        match table {
            "users" => tables.users.len(),
            "settings" => tables.settings.len(),
            "positions" => tables.positions.len(),
            "transactions" => tables.transactions.len(),
            "conversation_states" => tables.states.len(),
            other => panic!("unknown table {}", other),
        }
    }

    fn run(&self, sql: &str, p: &[SqlValue]) -> AppResult<Vec<Row>> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        if sql.starts_with("SELECT") {
            self.selects.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(err) = self.scripted_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if schema::STATEMENTS.contains(&sql) {
            return Ok(Vec::new());
        }

        let mut t = self.tables.lock().unwrap();
        let key = p.first().and_then(SqlValue::as_i64).unwrap_or_default();

        // users
        if sql == user_repository::sql::SELECT_BY_KEY {
            return Ok(rows(t.users.iter().filter(|r| int(r, "user_key") == key).cloned()));
        }
        if sql == user_repository::sql::INSERT {
            if t.user_exists(key) {
                return Err(duplicate("users_user_key_key"));
            }
            let id = t.next_id();
            let r = record(vec![
                ("id", Value::from(id)),
                ("user_key", p[0].to_json()),
                ("username", p[1].to_json()),
                ("language", p[2].to_json()),
                ("is_active", Value::from(true)),
                ("created_at", p[3].to_json()),
                ("updated_at", p[3].to_json()),
                ("version", Value::from(1)),
            ]);
            t.users.push(r.clone());
            return Ok(rows([r]));
        }
        if sql == user_repository::sql::UPDATE {
            let updated = t.users.iter_mut().find(|r| int(r, "user_key") == key).map(|r| {
                coalesce(r, "username", &p[1]);
                coalesce(r, "language", &p[2]);
                coalesce(r, "is_active", &p[3]);
                bump(r, &p[4]);
                r.clone()
            });
            return Ok(rows(updated));
        }
        if sql == user_repository::sql::DELETE {
            let removed = remove_where(&mut t.users, |r| int(r, "user_key") == key);
            if !removed.is_empty() {
                // ON DELETE CASCADE
                remove_where(&mut t.settings, |r| int(r, "user_key") == key);
                remove_where(&mut t.positions, |r| int(r, "user_key") == key);
                remove_where(&mut t.transactions, |r| int(r, "user_key") == key);
                remove_where(&mut t.states, |r| int(r, "user_key") == key);
            }
            return Ok(id_rows(removed));
        }

        // settings
        if sql == settings_repository::sql::SELECT_BY_KEY {
            return Ok(rows(t.settings.iter().filter(|r| int(r, "user_key") == key).cloned()));
        }
        if sql == settings_repository::sql::INSERT {
            t.require_user(key, "settings")?;
            if t.settings.iter().any(|r| int(r, "user_key") == key) {
                return Err(duplicate("settings_user_key_key"));
            }
            let id = t.next_id();
            let r = record(vec![
                ("id", Value::from(id)),
                ("user_key", p[0].to_json()),
                ("slippage_bps", p[1].to_json()),
                ("max_trade_amount", p[2].to_json()),
                ("auto_buy", p[3].to_json()),
                ("gas_priority", p[4].to_json()),
                ("notifications", p[5].to_json()),
                ("updated_at", p[6].to_json()),
                ("version", Value::from(1)),
            ]);
            t.settings.push(r.clone());
            return Ok(rows([r]));
        }
        if sql == settings_repository::sql::UPDATE {
            let updated = t.settings.iter_mut().find(|r| int(r, "user_key") == key).map(|r| {
                coalesce(r, "slippage_bps", &p[1]);
                coalesce(r, "max_trade_amount", &p[2]);
                coalesce(r, "auto_buy", &p[3]);
                coalesce(r, "gas_priority", &p[4]);
                coalesce(r, "notifications", &p[5]);
                bump(r, &p[6]);
                r.clone()
            });
            return Ok(rows(updated));
        }
        if sql == settings_repository::sql::DELETE {
            return Ok(id_rows(remove_where(&mut t.settings, |r| int(r, "user_key") == key)));
        }

        // positions
        if sql == portfolio_repository::sql::SELECT_BY_USER {
            let mut found: Vec<_> = t.positions.iter().filter(|r| int(r, "user_key") == key).cloned().collect();
            found.sort_by(|a, b| text(a, "token_address").cmp(text(b, "token_address")));
            return Ok(rows(found));
        }
        if sql == portfolio_repository::sql::INSERT {
            t.require_user(key, "positions")?;
            let token = p[1].to_json();
            if t.positions.iter().any(|r| int(r, "user_key") == key && r.get("token_address") == Some(&token)) {
                return Err(duplicate("positions_user_key_token_address_key"));
            }
            let id = t.next_id();
            let r = record(vec![
                ("id", Value::from(id)),
                ("user_key", p[0].to_json()),
                ("token_address", token),
                ("symbol", p[2].to_json()),
                ("amount", p[3].to_json()),
                ("avg_price", p[4].to_json()),
                ("updated_at", p[5].to_json()),
                ("version", Value::from(1)),
            ]);
            t.positions.push(r.clone());
            return Ok(rows([r]));
        }
        if sql == portfolio_repository::sql::UPDATE {
            let token = p[1].to_json();
            let updated = t
                .positions
                .iter_mut()
                .find(|r| int(r, "user_key") == key && r.get("token_address") == Some(&token))
                .map(|r| {
                    coalesce(r, "amount", &p[2]);
                    coalesce(r, "avg_price", &p[3]);
                    bump(r, &p[4]);
                    r.clone()
                });
            return Ok(rows(updated));
        }
        if sql == portfolio_repository::sql::DELETE_ONE {
            let token = p[1].to_json();
            return Ok(id_rows(remove_where(&mut t.positions, |r| {
                int(r, "user_key") == key && r.get("token_address") == Some(&token)
            })));
        }
        if sql == portfolio_repository::sql::DELETE_ALL {
            return Ok(id_rows(remove_where(&mut t.positions, |r| int(r, "user_key") == key)));
        }

        // transactions
        if sql == transaction_repository::sql::SELECT_RECENT {
            let limit = p[1].as_i64().unwrap_or(i64::MAX) as usize;
            let mut found: Vec<_> = t.transactions.iter().filter(|r| int(r, "user_key") == key).cloned().collect();
            found.sort_by(|a, b| {
                int(b, "created_at")
                    .cmp(&int(a, "created_at"))
                    .then(int(b, "id").cmp(&int(a, "id")))
            });
            found.truncate(limit);
            return Ok(rows(found));
        }
        if sql == transaction_repository::sql::SELECT_BY_HASH {
            let hash = p[0].to_json();
            return Ok(rows(t.transactions.iter().filter(|r| r.get("tx_hash") == Some(&hash)).cloned()));
        }
        if sql == transaction_repository::sql::INSERT {
            t.require_user(key, "transactions")?;
            let hash = p[1].to_json();
            if t.transactions.iter().any(|r| r.get("tx_hash") == Some(&hash)) {
                return Err(duplicate("transactions_tx_hash_key"));
            }
            let id = t.next_id();
            let r = record(vec![
                ("id", Value::from(id)),
                ("user_key", p[0].to_json()),
                ("tx_hash", hash),
                ("token_address", p[2].to_json()),
                ("side", p[3].to_json()),
                ("amount", p[4].to_json()),
                ("price", p[5].to_json()),
                ("status", p[6].to_json()),
                ("created_at", p[7].to_json()),
                ("updated_at", p[7].to_json()),
                ("version", Value::from(1)),
            ]);
            t.transactions.push(r.clone());
            return Ok(rows([r]));
        }
        if sql == transaction_repository::sql::UPDATE {
            let updated = t.transactions.iter_mut().find(|r| int(r, "id") == key).map(|r| {
                coalesce(r, "status", &p[1]);
                coalesce(r, "amount", &p[2]);
                coalesce(r, "price", &p[3]);
                bump(r, &p[4]);
                r.clone()
            });
            return Ok(rows(updated));
        }
        if sql == transaction_repository::sql::DELETE_ALL {
            return Ok(id_rows(remove_where(&mut t.transactions, |r| int(r, "user_key") == key)));
        }

        // conversation_states
        if sql == state_repository::sql::SELECT_BY_KEY {
            return Ok(rows(t.states.iter().filter(|r| int(r, "user_key") == key).cloned()));
        }
        if sql == state_repository::sql::INSERT || sql == state_repository::sql::UPSERT {
            t.require_user(key, "conversation_states")?;
            if let Some(r) = t.states.iter_mut().find(|r| int(r, "user_key") == key) {
                if sql == state_repository::sql::INSERT {
                    return Err(duplicate("conversation_states_user_key_key"));
                }
                r.insert("state".to_string(), p[1].to_json());
                r.insert("payload".to_string(), p[2].to_json());
                bump(r, &p[3]);
                return Ok(rows([r.clone()]));
            }
            let id = t.next_id();
            let r = record(vec![
                ("id", Value::from(id)),
                ("user_key", p[0].to_json()),
                ("state", p[1].to_json()),
                ("payload", p[2].to_json()),
                ("updated_at", p[3].to_json()),
                ("version", Value::from(1)),
            ]);
            t.states.push(r.clone());
            return Ok(rows([r]));
        }
        if sql == state_repository::sql::UPDATE {
            let updated = t.states.iter_mut().find(|r| int(r, "user_key") == key).map(|r| {
                coalesce(r, "state", &p[1]);
                coalesce(r, "payload", &p[2]);
                bump(r, &p[3]);
                r.clone()
            });
            return Ok(rows(updated));
        }
        if sql == state_repository::sql::DELETE {
            return Ok(id_rows(remove_where(&mut t.states, |r| int(r, "user_key") == key)));
        }

        Err(AppError::Query(format!("[42601] unexpected statement: {}", sql)))
    }
}

pub struct FakeDbConnector {
    db: Arc<FakeDb>,
}

#[async_trait]
impl Connector for FakeDbConnector {
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>> {
        Ok(Box::new(FakeDbConnection {
            db: self.db.clone(),
        }))
    }

    fn describe(&self) -> String {
        "fake://quant_bot".to_string()
    }
}

struct FakeDbConnection {
    db: Arc<FakeDb>,
}

#[async_trait]
impl StoreConnection for FakeDbConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        // 让出一次，模拟网络往返
        tokio::task::yield_now().await;
        let rows = self.db.run(sql, params)?;
        if self.db.take_lost_reply() {
            return Err(AppError::QueryTimeout(Duration::from_secs(10)));
        }
        Ok(rows)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        self.query(sql, params).await.map(|rows| rows.len() as u64)
    }

    async fn ping(&mut self) -> AppResult<()> {
        Ok(())
    }
}

pub fn ttl_config() -> TtlConfig {
    TtlConfig {
        portfolio: Duration::from_secs(2),
        transactions: Duration::from_secs(30),
        state: Duration::from_secs(600),
    }
}

/// 一套测试环境：内存库、内存缓存、执行器和协调器
pub struct Harness {
    pub db: Arc<FakeDb>,
    pub cache: InMemoryCacheStore,
    pub executor: Arc<QueryExecutor>,
    pub coordinator: Arc<CacheCoordinator>,
}

impl Harness {
    pub async fn new() -> Self {
        let cache = InMemoryCacheStore::new();
        Self::with_store(cache.clone(), cache).await
    }

    /// 使用指定的缓存后端，`cache` 只用于断言
    pub async fn with_store(store: impl CacheStore + 'static, cache: InMemoryCacheStore) -> Self {
        let db = Arc::new(FakeDb::default());
        let connector = Arc::new(FakeDbConnector { db: db.clone() });
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                min_connections: 1,
                max_connections: 8,
                acquire_timeout: Duration::from_secs(1),
                ..PoolConfig::default()
            },
        );
        pool.initialize().await.unwrap();

        let executor = Arc::new(QueryExecutor::new(
            pool,
            ExecutorConfig {
                max_retries: 3,
                retry_base_delay: Duration::from_millis(50),
                ..ExecutorConfig::default()
            },
        ));
        let adapter = CacheAdapter::new(Arc::new(store), Duration::from_millis(200));
        let coordinator = Arc::new(CacheCoordinator::new(adapter, ttl_config()));

        Self {
            db,
            cache,
            executor,
            coordinator,
        }
    }
}
