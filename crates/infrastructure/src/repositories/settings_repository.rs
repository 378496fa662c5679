//! 交易设置仓储实现

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use quant_bot_common::utils::now_millis;
use quant_bot_common::{AppError, Result};
use quant_bot_core::database::{QueryExecutor, SqlValue};
use quant_bot_domain::traits::SettingsRepository;
use quant_bot_domain::{Namespace, NewSettings, Settings, SettingsPatch};

use super::{decode_first, require_first};
use crate::cache::CacheCoordinator;

macro_rules! settings_columns {
    () => {
        "id, user_key, slippage_bps, max_trade_amount, auto_buy, gas_priority, notifications, updated_at, version"
    };
}

pub mod sql {
    pub const SELECT_BY_KEY: &str =
        concat!("SELECT ", settings_columns!(), " FROM settings WHERE user_key = $1");

    pub const INSERT: &str = concat!(
        "INSERT INTO settings (user_key, slippage_bps, max_trade_amount, auto_buy, gas_priority, notifications, updated_at, version) ",
        "VALUES ($1, $2, $3, $4, $5, $6, $7, 1) RETURNING ",
        settings_columns!()
    );

    pub const UPDATE: &str = concat!(
        "UPDATE settings SET slippage_bps = COALESCE($2, slippage_bps), ",
        "max_trade_amount = COALESCE($3, max_trade_amount), auto_buy = COALESCE($4, auto_buy), ",
        "gas_priority = COALESCE($5, gas_priority), notifications = COALESCE($6, notifications), ",
        "updated_at = $7, version = version + 1 WHERE user_key = $1 RETURNING ",
        settings_columns!()
    );

    pub const DELETE: &str = "DELETE FROM settings WHERE user_key = $1 RETURNING id";
}

pub struct CachedSettingsRepository {
    executor: Arc<QueryExecutor>,
    cache: Arc<CacheCoordinator>,
}

impl CachedSettingsRepository {
    pub fn new(executor: Arc<QueryExecutor>, cache: Arc<CacheCoordinator>) -> Self {
        Self { executor, cache }
    }
}

#[async_trait]
impl SettingsRepository for CachedSettingsRepository {
    async fn get(&self, user_key: i64) -> Result<Settings> {
        if let Some(settings) = self.cache.get::<Settings>(Namespace::Settings, user_key).await {
            return Ok(settings);
        }

        let rows = self
            .executor
            .query_retrying(sql::SELECT_BY_KEY, &[SqlValue::from(user_key)])
            .await?;
        let settings: Settings =
            decode_first(rows)?.ok_or_else(|| AppError::not_found(format!("settings {}", user_key)))?;

        self.cache
            .populate(Namespace::Settings, user_key, &settings)
            .await;
        Ok(settings)
    }

    async fn create(&self, new_settings: NewSettings) -> Result<Settings> {
        new_settings.validate()?;

        let rows = self
            .executor
            .query_write_once(
                sql::INSERT,
                &[
                    SqlValue::from(new_settings.user_key),
                    SqlValue::from(new_settings.slippage_bps),
                    SqlValue::from(new_settings.max_trade_amount),
                    SqlValue::from(new_settings.auto_buy),
                    SqlValue::from(new_settings.gas_priority.as_str()),
                    SqlValue::from(new_settings.notifications),
                    SqlValue::from(now_millis()),
                ],
            )
            .await?;
        let settings: Settings =
            require_first(rows, || format!("inserted settings {}", new_settings.user_key))?;

        self.cache
            .set_static(Namespace::Settings, settings.user_key, &settings)
            .await;
        Ok(settings)
    }

    async fn update(&self, user_key: i64, patch: SettingsPatch) -> Result<Settings> {
        patch.validate()?;
        if patch.is_empty() {
            return self.get(user_key).await;
        }

        let result = self
            .executor
            .query_write_once(
                sql::UPDATE,
                &[
                    SqlValue::from(user_key),
                    SqlValue::from(patch.slippage_bps),
                    SqlValue::from(patch.max_trade_amount),
                    SqlValue::from(patch.auto_buy),
                    SqlValue::from(patch.gas_priority.map(|g| g.as_str())),
                    SqlValue::from(patch.notifications),
                    SqlValue::from(now_millis()),
                ],
            )
            .await;
        if matches!(result, Err(AppError::QueryTimeout(_))) {
            self.cache.invalidate(Namespace::Settings, user_key).await;
        }
        let rows = result?;
        let settings: Settings = require_first(rows, || format!("settings {}", user_key))?;

        self.cache
            .refresh_static(Namespace::Settings, user_key, &settings)
            .await;
        debug!(
            "更新交易设置: user_key={}, version={}",
            user_key, settings.version
        );
        Ok(settings)
    }

    async fn delete(&self, user_key: i64) -> Result<()> {
        let result = self
            .executor
            .query_write_once(sql::DELETE, &[SqlValue::from(user_key)])
            .await;
        self.cache.invalidate(Namespace::Settings, user_key).await;
        let rows = result?;

        if rows.is_empty() {
            return Err(AppError::not_found(format!("settings {}", user_key)));
        }
        Ok(())
    }
}
