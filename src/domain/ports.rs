use crate::domain::llm::{ChatMessage, ChatTurn, ToolSpec};
use crate::domain::trading::session::TradingSession;
use crate::domain::trading::types::{
    AccountSnapshot, CurrencyBalance, ExchangeOrder, MarginMode, OrderRequest, OrderResult,
    Position,
};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Uniform broker capability set, implemented by the exchange-backed broker
/// and the in-memory simulator. `get_positions` and `get_account_info`
/// degrade to empty/zeroed values on transient errors instead of failing the
/// cycle; auxiliary setter failures are warnings, never aborts.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult>;

    /// Open positions with non-zero amount. Unknown symbols yield nothing.
    async fn get_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>>;

    async fn get_account_info(&self) -> Result<AccountSnapshot>;

    /// Idempotent; a warning from the venue about an already-set value is
    /// not an error.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<()>;
}

/// The wire contract the exchange broker needs from its venue. Kept narrow
/// so tests can inject failing implementations per call site.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn last_price(&self, symbol: &str) -> Result<Decimal>;

    /// Places one order and returns the venue's order id.
    async fn create_order(&self, order: &ExchangeOrder) -> Result<String>;

    async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>>;

    /// Balance triple of the settlement currency; missing currencies resolve
    /// to the zero triple.
    async fn fetch_balance(&self) -> Result<CurrencyBalance>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<()>;
}

/// One chat turn against the LLM provider.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatTurn>;
}

/// Market data collaborator. The returned string is pre-formatted for the
/// model and opaque to the core.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<String>;
}

/// External web search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

/// Relational audit target for finished sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: &TradingSession) -> Result<()>;
}
