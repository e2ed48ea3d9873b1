//! Protection-failure scenarios through the full stack: tool bridge ->
//! exchange broker -> scripted venue, with the position manager watching.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tradepilot::application::agent::tools::{TOOL_PLACE_ORDER, ToolInvocation, ToolSet};
use tradepilot::application::position_manager::PositionManager;
use tradepilot::domain::ports::{Broker, ExchangeClient};
use tradepilot::domain::risk::config::{RiskConfig, TradingMode};
use tradepilot::domain::risk::guard::RiskGuard;
use tradepilot::domain::trading::types::{
    CurrencyBalance, ExchangeOrder, ExchangeOrderKind, MarginMode, OrderSide, Position,
    PositionSide,
};
use tradepilot::infrastructure::core::backoff::LinearBackoff;
use tradepilot::infrastructure::exchange::ExchangeBroker;
use tradepilot::infrastructure::market_data::SimulatedMarketDataFeed;
use tradepilot::infrastructure::simulation::SimulationBroker;

/// Venue that fills market orders into an internal position book but
/// rejects every STOP_MARKET creation.
struct StopRejectingVenue {
    positions: Mutex<HashMap<String, Position>>,
    orders: Mutex<Vec<ExchangeOrder>>,
}

impl StopRejectingVenue {
    fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
        }
    }

    fn stop_attempts(&self) -> usize {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| matches!(o.kind, ExchangeOrderKind::StopMarket(_)))
            .count()
    }

    fn reduce_only_closes(&self) -> usize {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.reduce_only && o.kind == ExchangeOrderKind::Market)
            .count()
    }
}

#[async_trait]
impl ExchangeClient for StopRejectingVenue {
    async fn last_price(&self, _symbol: &str) -> Result<Decimal> {
        Ok(dec!(100000))
    }

    async fn create_order(&self, order: &ExchangeOrder) -> Result<String> {
        self.orders.lock().unwrap().push(order.clone());

        match order.kind {
            ExchangeOrderKind::StopMarket(_) => anyhow::bail!("STOP_MARKET rejected"),
            ExchangeOrderKind::Market => {
                let mut positions = self.positions.lock().unwrap();
                if order.reduce_only {
                    positions.remove(&order.symbol);
                } else {
                    positions.insert(
                        order.symbol.clone(),
                        Position {
                            symbol: order.symbol.clone(),
                            side: PositionSide::from_entry_side(order.side),
                            amount: order.amount,
                            entry_price: dec!(100000),
                            mark_price: dec!(100000),
                            unrealized_pnl: Decimal::ZERO,
                            leverage: 5,
                            liquidation_price: dec!(80400),
                        },
                    );
                }
                Ok(format!("venue-{}", self.orders.lock().unwrap().len()))
            }
            _ => Ok("venue-other".to_string()),
        }
    }

    async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>> {
        let positions = self.positions.lock().unwrap();
        Ok(positions
            .values()
            .filter(|p| symbols.is_none_or(|symbols| symbols.contains(&p.symbol)))
            .cloned()
            .collect())
    }

    async fn fetch_balance(&self) -> Result<CurrencyBalance> {
        Ok(CurrencyBalance {
            free: dec!(10000),
            used: Decimal::ZERO,
            total: dec!(10000),
        })
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<()> {
        Ok(())
    }

    async fn set_margin_mode(&self, _symbol: &str, _mode: MarginMode) -> Result<()> {
        Ok(())
    }
}

fn risk_guard() -> Arc<RiskGuard> {
    let config = RiskConfig::new(
        TradingMode::Paper,
        10,
        dec!(100),
        vec!["BTC/USDT".to_string()],
        0.01,
        0.05,
        0.10,
        300_000,
        300_000,
        15_000,
        vec![],
    )
    .unwrap();
    Arc::new(RiskGuard::new(config))
}

#[tokio::test]
async fn test_protection_failure_rolls_back_and_empties_cache() {
    let venue = Arc::new(StopRejectingVenue::new());
    let broker = Arc::new(ExchangeBroker::with_backoff(
        venue.clone(),
        LinearBackoff::new(Duration::ZERO, 3),
    ));
    let positions = Arc::new(PositionManager::new(broker.clone()));

    // Market data is irrelevant here; wire the simulated feed.
    let feed = Arc::new(SimulatedMarketDataFeed::new(Arc::new(
        SimulationBroker::new_deterministic(dec!(0)),
    )));
    let toolset = ToolSet::new(broker, positions.clone(), risk_guard(), feed, None);

    let invocation = ToolInvocation::parse(
        TOOL_PLACE_ORDER,
        r#"{"symbol":"BTC/USDT","action":"open_long","cost":100,"leverage":5,"stop_loss":95000}"#,
    )
    .unwrap();
    let result = toolset.execute(invocation).await;

    assert_eq!(result["success"], false);
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .contains("protection failed")
    );
    assert_eq!(result["critical"], false);

    // Three stop attempts, then exactly one emergency close.
    assert_eq!(venue.stop_attempts(), 3);
    assert_eq!(venue.reduce_only_closes(), 1);

    // The bridge force-synced after the call: no net position anywhere.
    assert!(positions.get_position("BTC/USDT").await.is_none());
    assert!(
        venue
            .fetch_positions(None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_no_unprotected_open_survives() {
    // Property over a handful of protection prices: either the order
    // succeeds with a stop-loss order id, or the venue holds no position.
    for stop_loss in [dec!(90000), dec!(95000), dec!(99000)] {
        let venue = Arc::new(StopRejectingVenue::new());
        let broker = ExchangeBroker::with_backoff(
            venue.clone(),
            LinearBackoff::new(Duration::ZERO, 3),
        );

        let request = tradepilot::domain::trading::types::OrderRequest::market_open(
            "BTC/USDT",
            OrderSide::Buy,
            dec!(100),
            5,
        )
        .with_protection(Some(stop_loss), None);

        let result = broker.place_order(request).await.unwrap();
        let still_open = !venue.fetch_positions(None).await.unwrap().is_empty();

        if result.success {
            assert!(result.stop_loss_order_id.is_some());
        } else {
            assert!(!still_open || result.critical);
        }
    }
}
