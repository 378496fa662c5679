//! 表结构
//!
//! 所有用户数据表通过 `user_key` 外键引用 users，删除用户时由数据库级联删除

use tracing::info;

use quant_bot_common::Result;
use quant_bot_core::database::QueryExecutor;

pub const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        user_key BIGINT NOT NULL UNIQUE,
        username TEXT,
        language TEXT NOT NULL DEFAULT 'en',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        version BIGINT NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        id BIGSERIAL PRIMARY KEY,
        user_key BIGINT NOT NULL UNIQUE REFERENCES users(user_key) ON DELETE CASCADE,
        slippage_bps BIGINT NOT NULL,
        max_trade_amount DOUBLE PRECISION NOT NULL,
        auto_buy BOOLEAN NOT NULL DEFAULT FALSE,
        gas_priority TEXT NOT NULL DEFAULT 'medium',
        notifications BOOLEAN NOT NULL DEFAULT TRUE,
        updated_at BIGINT NOT NULL,
        version BIGINT NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS positions (
        id BIGSERIAL PRIMARY KEY,
        user_key BIGINT NOT NULL REFERENCES users(user_key) ON DELETE CASCADE,
        token_address TEXT NOT NULL,
        symbol TEXT NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        avg_price DOUBLE PRECISION NOT NULL,
        updated_at BIGINT NOT NULL,
        version BIGINT NOT NULL DEFAULT 1,
        UNIQUE (user_key, token_address)
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id BIGSERIAL PRIMARY KEY,
        user_key BIGINT NOT NULL REFERENCES users(user_key) ON DELETE CASCADE,
        tx_hash TEXT NOT NULL UNIQUE,
        token_address TEXT NOT NULL,
        side TEXT NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        status TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        version BIGINT NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS idx_transactions_user_created
        ON transactions (user_key, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS conversation_states (
        id BIGSERIAL PRIMARY KEY,
        user_key BIGINT NOT NULL UNIQUE REFERENCES users(user_key) ON DELETE CASCADE,
        state TEXT NOT NULL,
        payload JSONB NOT NULL DEFAULT '{}'::jsonb,
        updated_at BIGINT NOT NULL,
        version BIGINT NOT NULL DEFAULT 1
    )",
];

/// 建表，语句都是幂等的
pub async fn ensure_schema(executor: &QueryExecutor) -> Result<()> {
    for statement in STATEMENTS {
        executor.execute(statement, &[]).await?;
    }
    info!("数据库表结构已就绪 ({} 条语句)", STATEMENTS.len());
    Ok(())
}
