//! Risk configuration value object.
//!
//! Immutable once constructed; `new` enforces the invariants so every other
//! component can trust the bounds without re-checking them.

use crate::domain::trading::types::normalize_symbol;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

/// Hard ceiling on leverage, regardless of configuration.
pub const LEVERAGE_HARD_CAP: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
}

impl FromStr for TradingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            _ => anyhow::bail!("Invalid TRADING_MODE: {}. Must be 'paper' or 'live'", s),
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RiskConfigError {
    #[error("Invalid leverage limit: {value}. Must be between 1 and {LEVERAGE_HARD_CAP}")]
    InvalidLeverage { value: u32 },

    #[error("Invalid max cost per trade: {value}. Must be positive")]
    InvalidMaxCost { value: Decimal },

    #[error("Symbol whitelist must not be empty")]
    EmptyWhitelist,
}

/// Risk parameters governing every order the system may place.
///
/// # Invariants
///
/// - `max_leverage` in `[1, 20]`
/// - `max_cost_per_trade > 0`
/// - whitelist non-empty, all symbols normalized
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub mode: TradingMode,
    pub max_leverage: u32,
    pub max_cost_per_trade: Decimal,
    pub symbol_whitelist: HashSet<String>,
    pub slippage_tolerance: f64,
    pub default_stop_loss_percent: f64,
    pub default_take_profit_percent: f64,
    pub cooldown_ms: u64,
    pub interval_ms: u64,
    pub jitter_ms: u64,
    pub symbols: Vec<String>,
}

impl RiskConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: TradingMode,
        max_leverage: u32,
        max_cost_per_trade: Decimal,
        symbol_whitelist: Vec<String>,
        slippage_tolerance: f64,
        default_stop_loss_percent: f64,
        default_take_profit_percent: f64,
        cooldown_ms: u64,
        interval_ms: u64,
        jitter_ms: u64,
        symbols: Vec<String>,
    ) -> Result<Self, RiskConfigError> {
        if max_leverage == 0 || max_leverage > LEVERAGE_HARD_CAP {
            return Err(RiskConfigError::InvalidLeverage {
                value: max_leverage,
            });
        }
        if max_cost_per_trade <= Decimal::ZERO {
            return Err(RiskConfigError::InvalidMaxCost {
                value: max_cost_per_trade,
            });
        }
        if symbol_whitelist.is_empty() {
            return Err(RiskConfigError::EmptyWhitelist);
        }

        let symbol_whitelist = symbol_whitelist
            .iter()
            .map(|s| normalize_symbol(s))
            .collect();
        let symbols = symbols.iter().map(|s| normalize_symbol(s)).collect();

        Ok(Self {
            mode,
            max_leverage,
            max_cost_per_trade,
            symbol_whitelist,
            slippage_tolerance,
            default_stop_loss_percent,
            default_take_profit_percent,
            cooldown_ms,
            interval_ms,
            jitter_ms,
            symbols,
        })
    }
}
