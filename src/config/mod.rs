//! Configuration loading from environment variables.
//!
//! One `Config::from_env()` call assembles everything the bootstrap needs:
//! the risk parameters, the broker selection, and the credentials for the
//! exchange, the LLM provider and the search provider.

use crate::domain::risk::config::{LEVERAGE_HARD_CAP, RiskConfig, TradingMode};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use tracing::warn;

const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";
const BINANCE_FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Which broker implementation backs the system. Derived from
/// `TRADING_MODE` unless `BROKER_MODE` overrides it; `--dev` forces `Mock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerMode {
    Mock,
    Paper,
    Live,
}

impl FromStr for BrokerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(BrokerMode::Mock),
            "paper" => Ok(BrokerMode::Paper),
            "live" => Ok(BrokerMode::Live),
            _ => anyhow::bail!(
                "Invalid BROKER_MODE: {}. Must be 'mock', 'paper', or 'live'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeEnvConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct LlmEnvConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchEnvConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,
    pub broker_mode: BrokerMode,
    pub risk: RiskConfig,
    pub exchange: ExchangeEnvConfig,
    pub llm: LlmEnvConfig,
    pub search: SearchEnvConfig,
    pub database_url: String,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let trading_mode_str = env::var("TRADING_MODE").unwrap_or_else(|_| "paper".to_string());
        let trading_mode = TradingMode::from_str(&trading_mode_str)?;

        let broker_mode = match env::var("BROKER_MODE") {
            Ok(s) => BrokerMode::from_str(&s)?,
            Err(_) => match trading_mode {
                TradingMode::Paper => BrokerMode::Paper,
                TradingMode::Live => BrokerMode::Live,
            },
        };

        let mut max_leverage = parse_u32("MAX_LEVERAGE", 10)?;
        if max_leverage > LEVERAGE_HARD_CAP {
            warn!(
                "MAX_LEVERAGE {} exceeds the hard cap; clamping to {}",
                max_leverage, LEVERAGE_HARD_CAP
            );
            max_leverage = LEVERAGE_HARD_CAP;
        }

        let risk = RiskConfig::new(
            trading_mode,
            max_leverage,
            parse_decimal("MAX_COST_PER_TRADE", "100")?,
            parse_csv("SYMBOL_WHITELIST", "BTC/USDT,ETH/USDT,SOL/USDT"),
            parse_f64("SLIPPAGE_TOLERANCE", 0.01)?,
            parse_f64("DEFAULT_STOP_LOSS_PERCENT", 0.05)?,
            parse_f64("DEFAULT_TAKE_PROFIT_PERCENT", 0.10)?,
            parse_u64("COOLDOWN_MS", 300_000)?,
            parse_u64("INTERVAL_MS", 300_000)?,
            parse_u64("JITTER_MS", 15_000)?,
            parse_csv("SYMBOLS", "BTC/USDT,ETH/USDT"),
        )
        .map_err(|e| anyhow::anyhow!("Invalid risk config: {}", e))?;

        let default_exchange_url = match broker_mode {
            BrokerMode::Live => BINANCE_FUTURES_URL,
            _ => BINANCE_FUTURES_TESTNET_URL,
        };

        Ok(Self {
            trading_mode,
            broker_mode,
            risk,
            exchange: ExchangeEnvConfig {
                api_key: env::var("BINANCE_API_KEY").unwrap_or_default(),
                api_secret: env::var("BINANCE_API_SECRET").unwrap_or_default(),
                base_url: env::var("BINANCE_FUTURES_URL")
                    .unwrap_or_else(|_| default_exchange_url.to_string()),
            },
            llm: LlmEnvConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                base_url: env::var("OPENAI_BASE_URL").ok(),
            },
            search: SearchEnvConfig {
                api_key: env::var("SEARCH_API_KEY").ok().filter(|k| !k.is_empty()),
                base_url: env::var("SEARCH_BASE_URL")
                    .unwrap_or_else(|_| "https://api.tavily.com/search".to_string()),
            },
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/tradepilot.db".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        })
    }

    /// Credentials are only mandatory when real money or a real venue is
    /// involved; mock mode runs fully offline.
    pub fn require_credentials(&self) -> Result<()> {
        if self.broker_mode == BrokerMode::Mock {
            return Ok(());
        }
        if self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty() {
            anyhow::bail!(
                "BINANCE_API_KEY and BINANCE_API_SECRET are required when BROKER_MODE is not 'mock'"
            );
        }
        if self.llm.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is required when BROKER_MODE is not 'mock'");
        }
        Ok(())
    }
}

fn parse_u32(key: &str, default: u32) -> Result<u32> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u32>()
        .context(format!("Failed to parse {}", key))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_f64(key: &str, default: f64) -> Result<f64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<f64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<Decimal>()
        .context(format!("Failed to parse {}", key))
}

fn parse_csv(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
