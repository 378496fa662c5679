//! 交易相关枚举

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use quant_bot_common::AppError;

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    /// 持仓数量变化的符号
    pub fn sign(&self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }
}

/// 链上交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// 已广播，未确认
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    /// 终态不能再变更
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

/// Gas 优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GasPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl GasPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            GasPriority::Low => "low",
            GasPriority::Medium => "medium",
            GasPriority::High => "high",
        }
    }
}

macro_rules! impl_text_enum {
    ($ty:ident { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(AppError::Validation(format!(
                        "unknown {}: {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_text_enum!(TradeSide { "buy" => Buy, "sell" => Sell });
impl_text_enum!(TxStatus { "pending" => Pending, "confirmed" => Confirmed, "failed" => Failed });
impl_text_enum!(GasPriority { "low" => Low, "medium" => Medium, "high" => High });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!(TxStatus::Confirmed.to_string(), "confirmed");
        assert!("maybe".parse::<TxStatus>().is_err());
        assert_eq!(GasPriority::default(), GasPriority::Medium);
    }

    #[test]
    fn test_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&TxStatus::Pending).unwrap(), "\"pending\"");
        let side: TradeSide = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(side, TradeSide::Sell);
    }
}
