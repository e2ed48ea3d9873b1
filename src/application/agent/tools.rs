//! Tool bridge between the LLM driver and the trading core.
//!
//! Each tool has a typed parameter struct deserialized from the model's
//! JSON arguments; dispatch is a match over the parsed variant. Every
//! result is a tagged JSON object (`success` plus payload or `error`) so
//! the model always receives something it can reason about. The bridge
//! holds the shared broker and position-manager instances, which keeps all
//! tools on one coherent view of account state.

use crate::application::position_manager::{DEFAULT_MAX_POSITIONS, PositionManager};
use crate::domain::llm::ToolSpec;
use crate::domain::ports::{Broker, MarketDataFeed, SearchProvider};
use crate::domain::risk::guard::{RiskGuard, RiskVerdict};
use crate::domain::trading::types::{OrderRequest, OrderSide, normalize_symbol};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::OpenLong => "open_long",
            OrderAction::CloseLong => "close_long",
            OrderAction::OpenShort => "open_short",
            OrderAction::CloseShort => "close_short",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetMarketDataParams {
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct GetAccountInfoParams {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub initial_capital: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderParams {
    pub symbol: String,
    pub action: OrderAction,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
}

/// A validated tool call, ready for dispatch.
#[derive(Debug)]
pub enum ToolInvocation {
    GetMarketData(GetMarketDataParams),
    GetAccountInfo(GetAccountInfoParams),
    PlaceOrder(PlaceOrderParams),
    Search(SearchParams),
}

pub const TOOL_GET_MARKET_DATA: &str = "get_market_data";
pub const TOOL_GET_ACCOUNT_INFO: &str = "get_account_info";
pub const TOOL_PLACE_ORDER: &str = "place_order";
pub const TOOL_SEARCH: &str = "search";

impl ToolInvocation {
    /// Parses a raw tool call. Failures here are schema violations and are
    /// returned to the model verbatim, before anything touches the broker.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, String> {
        match name {
            TOOL_GET_MARKET_DATA => serde_json::from_str(arguments)
                .map(ToolInvocation::GetMarketData)
                .map_err(|e| format!("Invalid get_market_data arguments: {}", e)),
            TOOL_GET_ACCOUNT_INFO => serde_json::from_str(arguments)
                .map(ToolInvocation::GetAccountInfo)
                .map_err(|e| format!("Invalid get_account_info arguments: {}", e)),
            TOOL_PLACE_ORDER => serde_json::from_str(arguments)
                .map(ToolInvocation::PlaceOrder)
                .map_err(|e| format!("Invalid place_order arguments: {}", e)),
            TOOL_SEARCH => serde_json::from_str(arguments)
                .map(ToolInvocation::Search)
                .map_err(|e| format!("Invalid search arguments: {}", e)),
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

/// Tool definitions advertised to the LLM provider.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: TOOL_GET_MARKET_DATA.to_string(),
            description: "Fetch current market data for one instrument: last price and recent \
                          price history, pre-formatted for analysis."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "description": "Instrument, e.g. BTC/USDT" }
                },
                "required": ["symbol"]
            }),
        },
        ToolSpec {
            name: TOOL_GET_ACCOUNT_INFO.to_string(),
            description: "Fetch account balance, margin usage, open positions and performance \
                          statistics. Syncs positions for the given symbols first."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbols": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Symbols to refresh before reading"
                    },
                    "initial_capital": {
                        "type": "number",
                        "description": "Starting capital in USDT, used for return statistics"
                    }
                },
                "required": ["symbols"]
            }),
        },
        ToolSpec {
            name: TOOL_PLACE_ORDER.to_string(),
            description: "Open or close a futures position. Opening actions require cost and \
                          leverage and may attach stop_loss/take_profit prices; closing actions \
                          take neither."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string" },
                    "action": {
                        "type": "string",
                        "enum": ["open_long", "close_long", "open_short", "close_short"]
                    },
                    "cost": { "type": "number", "description": "Margin to commit, in USDT" },
                    "leverage": { "type": "integer", "minimum": 1, "maximum": 20 },
                    "stop_loss": { "type": "number", "description": "Stop-loss trigger price" },
                    "take_profit": { "type": "number", "description": "Take-profit trigger price" }
                },
                "required": ["symbol", "action"]
            }),
        },
        ToolSpec {
            name: TOOL_SEARCH.to_string(),
            description: "Search the web for recent news and context.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": ["query"]
            }),
        },
    ]
}

/// Per-symbol cooldown between opening trades. Closes are never throttled;
/// reducing risk must always be possible.
struct TradeCooldown {
    window: Duration,
    last_open: RwLock<HashMap<String, Instant>>,
}

impl TradeCooldown {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_open: RwLock::new(HashMap::new()),
        }
    }

    /// Remaining wait for `symbol`, or `None` when a new open is allowed.
    async fn remaining(&self, symbol: &str) -> Option<Duration> {
        if self.window.is_zero() {
            return None;
        }
        let last_open = self.last_open.read().await;
        let elapsed = last_open.get(symbol)?.elapsed();
        self.window.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    async fn mark(&self, symbol: &str) {
        self.last_open
            .write()
            .await
            .insert(symbol.to_string(), Instant::now());
    }
}

/// Shared-instance wiring for the four tools.
pub struct ToolSet {
    broker: Arc<dyn Broker>,
    positions: Arc<PositionManager>,
    risk_guard: Arc<RiskGuard>,
    market_data: Arc<dyn MarketDataFeed>,
    search: Option<Arc<dyn SearchProvider>>,
    cooldown: TradeCooldown,
    max_positions: usize,
}

impl ToolSet {
    pub fn new(
        broker: Arc<dyn Broker>,
        positions: Arc<PositionManager>,
        risk_guard: Arc<RiskGuard>,
        market_data: Arc<dyn MarketDataFeed>,
        search: Option<Arc<dyn SearchProvider>>,
    ) -> Self {
        let cooldown = TradeCooldown::new(risk_guard.cooldown());
        Self {
            broker,
            positions,
            risk_guard,
            market_data,
            search,
            cooldown,
            max_positions: DEFAULT_MAX_POSITIONS,
        }
    }

    pub async fn execute(&self, invocation: ToolInvocation) -> Value {
        match invocation {
            ToolInvocation::GetMarketData(params) => self.get_market_data(params).await,
            ToolInvocation::GetAccountInfo(params) => self.get_account_info(params).await,
            ToolInvocation::PlaceOrder(params) => self.place_order(params).await,
            ToolInvocation::Search(params) => self.search(params).await,
        }
    }

    async fn get_market_data(&self, params: GetMarketDataParams) -> Value {
        let symbol = normalize_symbol(&params.symbol);
        match self.market_data.snapshot(&symbol).await {
            Ok(data) => json!({ "success": true, "symbol": symbol, "data": data }),
            Err(e) => error_result(format!("Market data unavailable for {}: {}", symbol, e)),
        }
    }

    async fn get_account_info(&self, params: GetAccountInfoParams) -> Value {
        let symbols: Vec<String> = params.symbols.iter().map(|s| normalize_symbol(s)).collect();
        self.positions.force_sync(Some(&symbols)).await;

        let snapshot = match self.broker.get_account_info().await {
            Ok(snapshot) => snapshot,
            Err(e) => return error_result(format!("Account info unavailable: {}", e)),
        };

        let positions = self.positions.get_all_positions().await;
        let total_unrealized_pnl: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
        let current_account_value = snapshot.available_margin + total_unrealized_pnl;

        let initial = params.initial_capital.filter(|c| *c > Decimal::ZERO);
        let total_return_pct = initial.map(|initial| {
            ((current_account_value - initial) / initial)
                .to_f64()
                .unwrap_or(0.0)
        });

        json!({
            "success": true,
            "balance": snapshot.balance,
            "availableCash": snapshot.available_margin,
            "usedMargin": snapshot.used_margin,
            "totalUnrealizedPnl": total_unrealized_pnl,
            "currentAccountValue": current_account_value,
            "totalReturnPct": total_return_pct,
            "sharpeRatio": simplified_sharpe(&positions),
            "openPositions": positions,
        })
    }

    async fn place_order(&self, params: PlaceOrderParams) -> Value {
        let symbol = normalize_symbol(&params.symbol);
        match params.action {
            OrderAction::OpenLong => self.open(symbol, OrderSide::Buy, params).await,
            OrderAction::OpenShort => self.open(symbol, OrderSide::Sell, params).await,
            OrderAction::CloseLong => self.close(symbol, params.action).await,
            OrderAction::CloseShort => self.close(symbol, params.action).await,
        }
    }

    async fn open(&self, symbol: String, side: OrderSide, params: PlaceOrderParams) -> Value {
        let (Some(cost), Some(leverage)) = (params.cost, params.leverage) else {
            return error_result(format!(
                "{} requires both cost and leverage",
                params.action.as_str()
            ));
        };

        if let RiskVerdict::Rejected { reason } = self.risk_guard.validate(&symbol, cost, leverage)
        {
            warn!("ToolSet: risk guard rejected {}: {}", symbol, reason);
            return json!({ "success": false, "rejected": true, "error": reason });
        }

        if !self
            .positions
            .can_open_position(&symbol, self.max_positions)
            .await
        {
            return error_result(format!(
                "Cannot open a new position for {}: position already open or limit reached",
                symbol
            ));
        }

        if let Some(remaining) = self.cooldown.remaining(&symbol).await {
            return error_result(format!(
                "Trade cooldown active for {}: {}s remaining",
                symbol,
                remaining.as_secs().max(1)
            ));
        }

        let request = OrderRequest::market_open(&symbol, side, cost, leverage)
            .with_protection(params.stop_loss, params.take_profit);

        let result = match self.broker.place_order(request).await {
            Ok(result) => result,
            Err(e) => return error_result(format!("Order placement failed: {}", e)),
        };

        if result.success {
            self.cooldown.mark(&symbol).await;
        }

        let synced = [symbol.clone()];
        self.positions.force_sync(Some(&synced)).await;

        info!(
            "ToolSet: {} {} cost={} leverage={}x -> success={}",
            params.action.as_str(),
            symbol,
            cost,
            leverage,
            result.success
        );
        json!({
            "success": result.success,
            "orderId": result.order_id,
            "stopLossOrderId": result.stop_loss_order_id,
            "takeProfitOrderId": result.take_profit_order_id,
            "error": result.error,
            "critical": result.critical,
        })
    }

    async fn close(&self, symbol: String, action: OrderAction) -> Value {
        let position = self.positions.get_position(&symbol).await;
        let (expected, label) = match action {
            OrderAction::CloseLong => (crate::domain::trading::types::PositionSide::Long, "long"),
            OrderAction::CloseShort => {
                (crate::domain::trading::types::PositionSide::Short, "short")
            }
            _ => unreachable!("open actions never reach close"),
        };

        let Some(position) = position.filter(|p| p.side == expected) else {
            return error_result(format!("No {} position found for {}", label, symbol));
        };

        let request =
            OrderRequest::market_close(&symbol, position.side.closing_side(), position.amount);

        let result = match self.broker.place_order(request).await {
            Ok(result) => result,
            Err(e) => return error_result(format!("Close order failed: {}", e)),
        };

        let synced = [symbol.clone()];
        self.positions.force_sync(Some(&synced)).await;

        json!({
            "success": result.success,
            "orderId": result.order_id,
            "error": result.error,
        })
    }

    async fn search(&self, params: SearchParams) -> Value {
        let Some(provider) = &self.search else {
            return error_result("Search provider is not configured");
        };
        match provider.search(&params.query).await {
            Ok(result) => json!({ "success": true, "result": result }),
            Err(e) => error_result(format!("Search failed: {}", e)),
        }
    }
}

fn error_result(error: impl Into<String>) -> Value {
    json!({ "success": false, "error": error.into() })
}

/// Simplified Sharpe over per-position margin returns: mean over population
/// standard deviation, zero when fewer than two positions carry margin.
fn simplified_sharpe(positions: &[crate::domain::trading::types::Position]) -> f64 {
    let returns: Vec<f64> = positions
        .iter()
        .filter_map(|p| {
            let margin = p.margin_used();
            if margin <= Decimal::ZERO {
                return None;
            }
            (p.unrealized_pnl / margin).to_f64()
        })
        .collect();

    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 { 0.0 } else { mean / std_dev }
}
