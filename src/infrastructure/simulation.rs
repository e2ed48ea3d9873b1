//! In-memory broker for mock mode and tests.
//!
//! Keeps positions, a cash balance and a drifting price per symbol. Every
//! call nudges the relevant price by up to ±0.5% and sleeps 100-200 ms to
//! feel like a venue; both knobs are off in the deterministic variant used
//! by tests.

use crate::domain::ports::Broker;
use crate::domain::trading::types::{
    AccountSnapshot, MarginMode, OrderRequest, OrderResult, Position, PositionSide,
    normalize_symbol,
};
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Simplified maintenance-margin constant for the liquidation model.
const MAINTENANCE_MARGIN: f64 = 0.004;

#[derive(Debug, Clone)]
pub struct SimState {
    pub balance: Decimal,
    pub positions: Vec<Position>,
}

struct SimInner {
    balance: Decimal,
    positions: HashMap<String, Position>,
    prices: HashMap<String, Decimal>,
    next_order_id: u64,
}

pub struct SimulationBroker {
    inner: Mutex<SimInner>,
    realistic: bool,
}

impl SimulationBroker {
    pub fn new(initial_balance: Decimal) -> Self {
        Self::build(initial_balance, true)
    }

    /// Deterministic variant: no latency, no price drift.
    pub fn new_deterministic(initial_balance: Decimal) -> Self {
        Self::build(initial_balance, false)
    }

    fn build(initial_balance: Decimal, realistic: bool) -> Self {
        Self {
            inner: Mutex::new(SimInner {
                balance: initial_balance,
                positions: HashMap::new(),
                prices: default_prices(),
                next_order_id: 1,
            }),
            realistic,
        }
    }

    pub async fn seed_price(&self, symbol: &str, price: Decimal) {
        let mut inner = self.inner.lock().await;
        inner.prices.insert(normalize_symbol(symbol), price);
    }

    pub async fn last_price(&self, symbol: &str) -> Decimal {
        let mut inner = self.inner.lock().await;
        price_of(&mut inner, &normalize_symbol(symbol), self.realistic)
    }

    pub async fn reset(&self, initial_balance: Decimal) {
        let mut inner = self.inner.lock().await;
        inner.balance = initial_balance;
        inner.positions.clear();
        inner.prices = default_prices();
        inner.next_order_id = 1;
    }

    pub async fn state(&self) -> SimState {
        let inner = self.inner.lock().await;
        SimState {
            balance: inner.balance,
            positions: inner.positions.values().cloned().collect(),
        }
    }

    async fn simulate_latency(&self) {
        if !self.realistic {
            return;
        }
        let wait = rand::rng().random_range(100..=200);
        tokio::time::sleep(Duration::from_millis(wait)).await;
    }
}

fn default_prices() -> HashMap<String, Decimal> {
    HashMap::from([
        ("BTC/USDT".to_string(), dec!(100000)),
        ("ETH/USDT".to_string(), dec!(3800)),
        ("SOL/USDT".to_string(), dec!(180)),
        ("BNB/USDT".to_string(), dec!(650)),
        ("DOGE/USDT".to_string(), dec!(0.35)),
    ])
}

/// Current price for `symbol`, seeding unknown instruments at a random spot
/// and drifting known ones by up to ±0.5% per observation.
fn price_of(inner: &mut SimInner, symbol: &str, drift: bool) -> Decimal {
    let current = *inner.prices.entry(symbol.to_string()).or_insert_with(|| {
        let seeded = rand::rng().random_range(0.0..1000.0) + 100.0;
        Decimal::from_f64(seeded).unwrap_or(dec!(100))
    });

    if !drift {
        return current;
    }

    let factor = 1.0 + rand::rng().random_range(-0.005..0.005);
    let drifted = current * Decimal::from_f64(factor).unwrap_or(Decimal::ONE);
    inner.prices.insert(symbol.to_string(), drifted);
    drifted
}

fn liquidation_price(entry: Decimal, leverage: u32, side: PositionSide) -> Decimal {
    let offset = Decimal::ONE / Decimal::from(leverage.max(1))
        - Decimal::from_f64(MAINTENANCE_MARGIN).unwrap_or_default();
    match side {
        PositionSide::Long => entry * (Decimal::ONE - offset),
        PositionSide::Short => entry * (Decimal::ONE + offset),
    }
}

fn unrealized_pnl(position: &Position, mark: Decimal) -> Decimal {
    match position.side {
        PositionSide::Long => (mark - position.entry_price) * position.amount,
        PositionSide::Short => (position.entry_price - mark) * position.amount,
    }
}

#[async_trait]
impl Broker for SimulationBroker {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
        self.simulate_latency().await;

        let symbol = normalize_symbol(&request.symbol);
        let mut inner = self.inner.lock().await;
        let price = match request.price {
            Some(price) if request.order_type == crate::domain::trading::types::OrderType::Limit => {
                price
            }
            _ => price_of(&mut inner, &symbol, self.realistic),
        };

        let entry_side = PositionSide::from_entry_side(request.side);

        // An opposite-side order against an existing position closes it.
        if let Some(existing) = inner.positions.get(&symbol).cloned()
            && existing.side != entry_side
        {
            let pnl = unrealized_pnl(&existing, price);
            inner.balance += pnl;
            inner.positions.remove(&symbol);
            let order_id = format!("sim-{}", inner.next_order_id);
            inner.next_order_id += 1;
            info!(
                "SimulationBroker: closed {} {} at {} (pnl {})",
                existing.side, symbol, price, pnl
            );
            return Ok(OrderResult::ok(order_id));
        }

        if request.reduce_only {
            // Nothing to reduce; venues treat this as a no-op fill.
            let order_id = format!("sim-{}", inner.next_order_id);
            inner.next_order_id += 1;
            return Ok(OrderResult::ok(order_id));
        }

        let amount = match request.amount {
            Some(amount) => amount,
            None => {
                let (Some(cost), Some(leverage)) = (request.cost, request.leverage) else {
                    return Ok(OrderResult::failed(
                        "Order needs either an amount or cost with leverage",
                    ));
                };
                cost * Decimal::from(leverage) / price
            }
        };
        let leverage = request.leverage.unwrap_or(1);

        let position = Position {
            symbol: symbol.clone(),
            side: entry_side,
            amount,
            entry_price: price,
            mark_price: price,
            unrealized_pnl: Decimal::ZERO,
            leverage,
            liquidation_price: liquidation_price(price, leverage, entry_side),
        };
        inner.positions.insert(symbol.clone(), position);

        let order_id = format!("sim-{}", inner.next_order_id);
        inner.next_order_id += 1;

        let mut result = OrderResult::ok(order_id);
        if let Some(stop_loss) = request.stop_loss {
            result.stop_loss_order_id = Some(format!("sim-sl-{}", uuid::Uuid::new_v4()));
            info!(
                "SimulationBroker: stop-loss for {} registered at {}",
                symbol, stop_loss
            );
        }
        if let Some(take_profit) = request.take_profit {
            result.take_profit_order_id = Some(format!("sim-tp-{}", uuid::Uuid::new_v4()));
            info!(
                "SimulationBroker: take-profit for {} registered at {}",
                symbol, take_profit
            );
        }

        info!(
            "SimulationBroker: opened {} {} amount {} at {} ({}x)",
            entry_side, symbol, amount, price, leverage
        );
        Ok(result)
    }

    async fn get_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>> {
        self.simulate_latency().await;

        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = match symbols {
            Some(symbols) => symbols.iter().map(|s| normalize_symbol(s)).collect(),
            None => inner.positions.keys().cloned().collect(),
        };

        let mut positions = Vec::new();
        for key in keys {
            let mark = price_of(&mut inner, &key, self.realistic);
            if let Some(position) = inner.positions.get_mut(&key) {
                position.mark_price = mark;
                position.unrealized_pnl = unrealized_pnl(position, mark);
                if position.amount > Decimal::ZERO {
                    positions.push(position.clone());
                }
            }
        }
        Ok(positions)
    }

    async fn get_account_info(&self) -> Result<AccountSnapshot> {
        self.simulate_latency().await;

        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = inner.positions.keys().cloned().collect();

        let mut used_margin = Decimal::ZERO;
        let mut total_pnl = Decimal::ZERO;
        for key in keys {
            let mark = price_of(&mut inner, &key, self.realistic);
            if let Some(position) = inner.positions.get_mut(&key) {
                position.mark_price = mark;
                position.unrealized_pnl = unrealized_pnl(position, mark);
                used_margin += position.margin_used();
                total_pnl += position.unrealized_pnl;
            }
        }

        let balance = inner.balance + total_pnl;
        Ok(AccountSnapshot {
            balance,
            used_margin,
            available_margin: inner.balance - used_margin,
            total_pnl,
            total_margin: inner.balance,
        })
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<()> {
        Ok(())
    }

    async fn set_margin_mode(&self, _symbol: &str, _mode: MarginMode) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::OrderSide;

    #[tokio::test]
    async fn test_open_long_creates_position_with_liquidation_price() {
        let broker = SimulationBroker::new_deterministic(dec!(1000));
        let request = OrderRequest::market_open("BTC/USDT", OrderSide::Buy, dec!(100), 5);
        let result = broker.place_order(request).await.unwrap();
        assert!(result.success);

        let state = broker.state().await;
        assert_eq!(state.positions.len(), 1);
        let position = &state.positions[0];
        assert_eq!(position.side, PositionSide::Long);
        // 100 USDT * 5x at 100k -> 0.005 BTC
        assert_eq!(position.amount, dec!(0.005));
        // entry * (1 - (1/5 - 0.004)) = 100000 * 0.804
        assert_eq!(position.liquidation_price, dec!(80400));
    }

    #[tokio::test]
    async fn test_short_liquidation_sits_above_entry() {
        let broker = SimulationBroker::new_deterministic(dec!(1000));
        broker
            .place_order(OrderRequest::market_open(
                "ETH/USDT",
                OrderSide::Sell,
                dec!(50),
                4,
            ))
            .await
            .unwrap();

        let state = broker.state().await;
        let position = &state.positions[0];
        assert_eq!(position.side, PositionSide::Short);
        assert!(position.liquidation_price > position.entry_price);
    }

    #[tokio::test]
    async fn test_opposite_order_closes_and_realizes_pnl() {
        let broker = SimulationBroker::new_deterministic(dec!(1000));
        broker
            .place_order(OrderRequest::market_open(
                "BTC/USDT",
                OrderSide::Buy,
                dec!(100),
                5,
            ))
            .await
            .unwrap();

        // Mark the price up 2% and close; pnl = 2000 * 0.005 = 10.
        broker.seed_price("BTC/USDT", dec!(102000)).await;
        broker
            .place_order(OrderRequest::market_close(
                "BTC/USDT",
                OrderSide::Sell,
                dec!(0.005),
            ))
            .await
            .unwrap();

        let state = broker.state().await;
        assert!(state.positions.is_empty());
        assert_eq!(state.balance, dec!(1010));
    }

    #[tokio::test]
    async fn test_account_info_balance_identity() {
        let broker = SimulationBroker::new_deterministic(dec!(1000));
        broker
            .place_order(OrderRequest::market_open(
                "SOL/USDT",
                OrderSide::Buy,
                dec!(90),
                2,
            ))
            .await
            .unwrap();

        let snapshot = broker.get_account_info().await.unwrap();
        assert_eq!(
            snapshot.balance,
            snapshot.available_margin + snapshot.used_margin + snapshot.total_pnl
        );
        assert_eq!(snapshot.used_margin, dec!(90));
    }

    #[tokio::test]
    async fn test_unknown_symbols_yield_no_positions() {
        let broker = SimulationBroker::new_deterministic(dec!(1000));
        let symbols = vec!["XRP/USDT".to_string()];
        assert!(broker.get_positions(Some(&symbols)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let broker = SimulationBroker::new_deterministic(dec!(1000));
        broker
            .place_order(OrderRequest::market_open(
                "BTC/USDT",
                OrderSide::Buy,
                dec!(100),
                5,
            ))
            .await
            .unwrap();
        broker.reset(dec!(500)).await;

        let state = broker.state().await;
        assert!(state.positions.is_empty());
        assert_eq!(state.balance, dec!(500));
    }
}
