use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit record for one agent pass over one symbol. Exactly one of these is
/// produced per `process_symbol` invocation, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSession {
    pub symbol: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub prompt: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallLog>,
    pub success: bool,
    pub error: Option<String>,
    pub trades: Vec<TradeRecord>,
}

/// One tool invocation as seen by the LLM driver. Arguments and result are
/// kept opaque; the audit layer never re-interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallLog {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub operation: TradeOperation,
    pub leverage: Option<u32>,
    pub amount: Option<Decimal>,
    pub pricing: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOperation {
    Buy,
    Sell,
    Hold,
}

impl TradeOperation {
    /// Maps a free-form action string to the closed operation set. Anything
    /// mentioning a buy/long intent is a Buy, sell/short is a Sell, and the
    /// rest collapses to Hold.
    pub fn from_action(action: &str) -> Self {
        let lower = action.to_ascii_lowercase();
        if lower.contains("buy") || lower.contains("long") {
            TradeOperation::Buy
        } else if lower.contains("sell") || lower.contains("short") {
            TradeOperation::Sell
        } else {
            TradeOperation::Hold
        }
    }
}

impl fmt::Display for TradeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
