pub mod config;
pub mod guard;

pub use config::{RiskConfig, RiskConfigError, TradingMode};
pub use guard::{RiskGuard, RiskVerdict};
