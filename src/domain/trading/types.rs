use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that reduces a position opened with `self`.
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side of the order that closes this position.
    pub fn closing_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    pub fn from_entry_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
    Isolated,
    Cross,
}

impl fmt::Display for MarginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginMode::Isolated => write!(f, "ISOLATED"),
            MarginMode::Cross => write!(f, "CROSSED"),
        }
    }
}

/// A request to the broker. Exactly one sizing shape is legal: an explicit
/// `amount`, or `cost` together with `leverage` (the broker derives the
/// amount from the last price). Limit orders carry `price`; reduce-only
/// requests never carry protective prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub price: Option<Decimal>,
    pub leverage: Option<u32>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub reduce_only: bool,
}

impl OrderRequest {
    /// Market order opening a position sized by margin cost and leverage.
    pub fn market_open(symbol: &str, side: OrderSide, cost: Decimal, leverage: u32) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            side,
            order_type: OrderType::Market,
            amount: None,
            cost: Some(cost),
            price: None,
            leverage: Some(leverage),
            stop_loss: None,
            take_profit: None,
            reduce_only: false,
        }
    }

    /// Reduce-only market order unwinding `amount` of an existing position.
    pub fn market_close(symbol: &str, side: OrderSide, amount: Decimal) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            side,
            order_type: OrderType::Market,
            amount: Some(amount),
            cost: None,
            price: None,
            leverage: None,
            stop_loss: None,
            take_profit: None,
            reduce_only: true,
        }
    }

    pub fn with_protection(
        mut self,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }
}

/// Outcome of a `place_order` call. `success` implies the main order was
/// accepted and every requested protective order exists; otherwise the
/// position was rolled back, or `critical` is set and manual intervention
/// is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub stop_loss_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    pub error: Option<String>,
    pub critical: bool,
}

impl OrderResult {
    pub fn ok(order_id: String) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: u32,
    pub liquidation_price: Decimal,
}

impl Position {
    /// Margin locked by this position at its entry price.
    pub fn margin_used(&self) -> Decimal {
        if self.leverage == 0 {
            return Decimal::ZERO;
        }
        self.amount * self.entry_price / Decimal::from(self.leverage)
    }
}

/// Account state as reported by the broker. The fields satisfy
/// `balance = available_margin + used_margin + total_pnl`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub used_margin: Decimal,
    pub available_margin: Decimal,
    pub total_pnl: Decimal,
    pub total_margin: Decimal,
}

/// Per-currency balance triple from the exchange wallet endpoint. Missing
/// currencies resolve to the zero triple so downstream math stays total.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyBalance {
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// One order on the exchange wire, already sized. This is the shape the
/// protected-order protocol hands to the exchange client; protective legs
/// use the stop kinds.
#[derive(Debug, Clone)]
pub struct ExchangeOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: ExchangeOrderKind,
    pub amount: Decimal,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExchangeOrderKind {
    Market,
    Limit(Decimal),
    StopMarket(Decimal),
    TakeProfitMarket(Decimal),
}

impl ExchangeOrderKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            ExchangeOrderKind::Market => "MARKET",
            ExchangeOrderKind::Limit(_) => "LIMIT",
            ExchangeOrderKind::StopMarket(_) => "STOP_MARKET",
            ExchangeOrderKind::TakeProfitMarket(_) => "TAKE_PROFIT_MARKET",
        }
    }
}

/// One OHLCV bar as delivered by the venue's kline endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub open_time: i64,
}

/// Normalizes an instrument identifier to the `BASE/QUOTE` form used across
/// the system. Bare tickers get the USDT quote appended; symbols that
/// already carry a separator are kept as-is, including exchange-specific
/// settlement suffixes such as `BTC/USDT:USDC`.
pub fn normalize_symbol(symbol: &str) -> String {
    let trimmed = symbol.trim();
    if trimmed.contains('/') {
        trimmed.to_string()
    } else {
        format!("{}/USDT", trimmed.to_ascii_uppercase())
    }
}
