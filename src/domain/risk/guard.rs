use crate::domain::risk::config::{RiskConfig, TradingMode};
use crate::domain::trading::types::normalize_symbol;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Outcome of a pre-trade check. A rejection never has side effects; the
/// reason is surfaced verbatim to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    Allowed,
    Rejected { reason: String },
}

impl RiskVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskVerdict::Allowed)
    }
}

/// Stateless validator for proposed orders: whitelist, leverage band, and
/// per-trade cost ceiling. Also the source of truth the system prompt is
/// rendered from, via the read-only accessors.
pub struct RiskGuard {
    config: RiskConfig,
}

impl RiskGuard {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, symbol: &str, cost: Decimal, leverage: u32) -> RiskVerdict {
        let symbol = normalize_symbol(symbol);

        if !self.config.symbol_whitelist.contains(&symbol) {
            let mut allowed: Vec<&str> = self
                .config
                .symbol_whitelist
                .iter()
                .map(String::as_str)
                .collect();
            allowed.sort_unstable();
            return RiskVerdict::Rejected {
                reason: format!(
                    "Symbol {} is not whitelisted. Allowed symbols: {}",
                    symbol,
                    allowed.join(", ")
                ),
            };
        }

        if leverage == 0 || leverage > self.config.max_leverage {
            return RiskVerdict::Rejected {
                reason: format!(
                    "Leverage {}x is outside the allowed range 1-{}x",
                    leverage, self.config.max_leverage
                ),
            };
        }

        if cost <= Decimal::ZERO {
            return RiskVerdict::Rejected {
                reason: format!("Cost {} must be positive", cost),
            };
        }
        if cost > self.config.max_cost_per_trade {
            return RiskVerdict::Rejected {
                reason: format!(
                    "Cost {} exceeds the per-trade maximum of {} USDT",
                    cost, self.config.max_cost_per_trade
                ),
            };
        }

        RiskVerdict::Allowed
    }

    pub fn mode(&self) -> TradingMode {
        self.config.mode
    }

    pub fn max_leverage(&self) -> u32 {
        self.config.max_leverage
    }

    pub fn max_cost_per_trade(&self) -> Decimal {
        self.config.max_cost_per_trade
    }

    pub fn whitelist(&self) -> &HashSet<String> {
        &self.config.symbol_whitelist
    }

    pub fn cooldown(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.cooldown_ms)
    }

    pub fn default_stop_loss_percent(&self) -> f64 {
        self.config.default_stop_loss_percent
    }

    pub fn default_take_profit_percent(&self) -> f64 {
        self.config.default_take_profit_percent
    }
}
