//! 交易设置实体

use serde::{Deserialize, Serialize};

use quant_bot_common::{AppError, Result};

use super::Versioned;
use crate::enums::GasPriority;

/// 最大滑点 50%
pub const MAX_SLIPPAGE_BPS: i64 = 5_000;

/// 用户交易设置
///
/// 业务规则:
/// - 滑点以基点表示，范围 0 - 5000
/// - 单笔最大交易金额必须大于 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,
    pub user_key: i64,
    pub slippage_bps: i64,
    pub max_trade_amount: f64,
    pub auto_buy: bool,
    pub gas_priority: GasPriority,
    pub notifications: bool,
    pub updated_at: i64,
    pub version: i64,
}

impl Versioned for Settings {
    fn version(&self) -> i64 {
        self.version
    }
}

fn validate_slippage(bps: i64) -> Result<()> {
    if !(0..=MAX_SLIPPAGE_BPS).contains(&bps) {
        return Err(AppError::Validation(format!(
            "slippage_bps out of range: {} (allowed 0-{})",
            bps, MAX_SLIPPAGE_BPS
        )));
    }
    Ok(())
}

fn validate_trade_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(format!(
            "max_trade_amount must be positive: {}",
            amount
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSettings {
    pub user_key: i64,
    pub slippage_bps: i64,
    pub max_trade_amount: f64,
    pub auto_buy: bool,
    pub gas_priority: GasPriority,
    pub notifications: bool,
}

impl NewSettings {
    /// 新用户的默认设置：1% 滑点，关闭自动买入
    pub fn defaults(user_key: i64) -> Self {
        Self {
            user_key,
            slippage_bps: 100,
            max_trade_amount: 1.0,
            auto_buy: false,
            gas_priority: GasPriority::Medium,
            notifications: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_slippage(self.slippage_bps)?;
        validate_trade_amount(self.max_trade_amount)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub slippage_bps: Option<i64>,
    pub max_trade_amount: Option<f64>,
    pub auto_buy: Option<bool>,
    pub gas_priority: Option<GasPriority>,
    pub notifications: Option<bool>,
}

impl SettingsPatch {
    pub fn slippage(bps: i64) -> Self {
        Self {
            slippage_bps: Some(bps),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slippage_bps.is_none()
            && self.max_trade_amount.is_none()
            && self.auto_buy.is_none()
            && self.gas_priority.is_none()
            && self.notifications.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(bps) = self.slippage_bps {
            validate_slippage(bps)?;
        }
        if let Some(amount) = self.max_trade_amount {
            validate_trade_amount(amount)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(NewSettings::defaults(42).validate().is_ok());
        assert!(SettingsPatch::slippage(5).validate().is_ok());
        assert!(matches!(
            SettingsPatch::slippage(-1).validate(),
            Err(AppError::Validation(_))
        ));
        assert!(SettingsPatch::slippage(MAX_SLIPPAGE_BPS + 1).validate().is_err());

        let patch = SettingsPatch {
            max_trade_amount: Some(f64::NAN),
            ..SettingsPatch::default()
        };
        assert!(patch.validate().is_err());
        assert!(SettingsPatch::default().is_empty());
    }
}
