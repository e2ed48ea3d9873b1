pub mod session;
pub mod types;

pub use session::{ToolCallLog, TradeOperation, TradeRecord, TradingSession};
pub use types::{
    AccountSnapshot, Candle, CurrencyBalance, ExchangeOrder, ExchangeOrderKind, MarginMode,
    OrderRequest, OrderResult, OrderSide, OrderType, Position, PositionSide, normalize_symbol,
};
