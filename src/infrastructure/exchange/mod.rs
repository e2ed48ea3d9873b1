//! Exchange-backed broker and the protected-order protocol.
//!
//! `place_order` is a small state machine: configure leverage and margin
//! mode (warnings only), size the order, place the main leg, then attach
//! protection. A stop-loss that cannot be placed after the retry ladder
//! forces an emergency close of the just-opened position; if even that
//! fails the result is flagged critical and names the orphaned order.

pub mod binance;

use crate::domain::ports::{Broker, ExchangeClient};
use crate::domain::trading::types::{
    AccountSnapshot, ExchangeOrder, ExchangeOrderKind, MarginMode, OrderRequest, OrderResult,
    OrderSide, OrderType, Position,
};
use crate::infrastructure::core::backoff::LinearBackoff;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct ExchangeBroker {
    client: Arc<dyn ExchangeClient>,
    protection_backoff: LinearBackoff,
}

impl ExchangeBroker {
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self::with_backoff(client, LinearBackoff::default())
    }

    pub fn with_backoff(client: Arc<dyn ExchangeClient>, protection_backoff: LinearBackoff) -> Self {
        Self {
            client,
            protection_backoff,
        }
    }

    /// CONFIGURE: leverage and margin mode are re-applied per order. The
    /// venue answers with a warning when nothing changes; neither failure
    /// may abort the order.
    async fn configure(&self, request: &OrderRequest) {
        if let Some(leverage) = request.leverage
            && let Err(e) = self.client.set_leverage(&request.symbol, leverage).await
        {
            warn!(
                "ExchangeBroker: set_leverage({}, {}x) failed: {}",
                request.symbol, leverage, e
            );
        }
        if let Err(e) = self
            .client
            .set_margin_mode(&request.symbol, MarginMode::Isolated)
            .await
        {
            warn!(
                "ExchangeBroker: set_margin_mode({}) failed: {}",
                request.symbol, e
            );
        }
    }

    /// SIZE: explicit amount wins; otherwise notional = cost * leverage at
    /// the current last price.
    async fn size_order(&self, request: &OrderRequest) -> Result<Decimal, String> {
        if let Some(amount) = request.amount {
            if amount <= Decimal::ZERO {
                return Err(format!("Order amount must be positive, got {}", amount));
            }
            return Ok(amount);
        }

        let (Some(cost), Some(leverage)) = (request.cost, request.leverage) else {
            return Err("Order needs either an amount or cost with leverage".to_string());
        };

        let last_price = self
            .client
            .last_price(&request.symbol)
            .await
            .map_err(|e| format!("Ticker fetch failed for {}: {}", request.symbol, e))?;
        if last_price <= Decimal::ZERO {
            return Err(format!("No usable price for {}", request.symbol));
        }

        Ok(cost * Decimal::from(leverage) / last_price)
    }

    /// Places one protective leg with the linear retry ladder. Returns the
    /// order id of the first successful attempt.
    async fn place_protective(
        &self,
        symbol: &str,
        side: OrderSide,
        kind: ExchangeOrderKind,
        amount: Decimal,
    ) -> Result<String, String> {
        let mut last_error = String::new();

        for attempt in 1..=self.protection_backoff.max_attempts {
            let order = ExchangeOrder {
                symbol: symbol.to_string(),
                side,
                kind,
                amount,
                reduce_only: true,
            };
            match self.client.create_order(&order).await {
                Ok(order_id) => {
                    info!(
                        "ExchangeBroker: {} {} placed for {} (attempt {})",
                        kind.wire_name(),
                        order_id,
                        symbol,
                        attempt
                    );
                    return Ok(order_id);
                }
                Err(e) => {
                    warn!(
                        "ExchangeBroker: {} attempt {}/{} failed for {}: {}",
                        kind.wire_name(),
                        attempt,
                        self.protection_backoff.max_attempts,
                        symbol,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if let Some(delay) = self.protection_backoff.delay_after(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    /// ROLLBACK: unwind the freshly opened position with a reduce-only
    /// market order on the opposite side.
    async fn rollback(
        &self,
        request: &OrderRequest,
        amount: Decimal,
        main_order_id: &str,
    ) -> OrderResult {
        error!(
            "ExchangeBroker: stop-loss could not be placed for {}; closing position from order {}",
            request.symbol, main_order_id
        );

        let close = ExchangeOrder {
            symbol: request.symbol.clone(),
            side: request.side.opposite(),
            kind: ExchangeOrderKind::Market,
            amount,
            reduce_only: true,
        };

        match self.client.create_order(&close).await {
            Ok(close_id) => {
                info!(
                    "ExchangeBroker: emergency close {} executed for {}",
                    close_id, request.symbol
                );
                OrderResult {
                    success: false,
                    order_id: Some(main_order_id.to_string()),
                    error: Some("protection failed; position closed".to_string()),
                    ..Default::default()
                }
            }
            Err(e) => {
                error!(
                    "ExchangeBroker: emergency close FAILED for {}: {}",
                    request.symbol, e
                );
                OrderResult {
                    success: false,
                    order_id: Some(main_order_id.to_string()),
                    critical: true,
                    error: Some(format!(
                        "MANUAL INTERVENTION REQUIRED: order {} holds an unprotected position \
                         and the emergency close failed: {}",
                        main_order_id, e
                    )),
                    ..Default::default()
                }
            }
        }
    }
}

#[async_trait]
impl Broker for ExchangeBroker {
    #[instrument(skip(self, request), fields(symbol = %request.symbol, side = %request.side))]
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
        self.configure(&request).await;

        let amount = match self.size_order(&request).await {
            Ok(amount) => amount,
            Err(reason) => return Ok(OrderResult::failed(reason)),
        };

        let kind = match request.order_type {
            OrderType::Market => ExchangeOrderKind::Market,
            OrderType::Limit => match request.price {
                Some(price) => ExchangeOrderKind::Limit(price),
                None => return Ok(OrderResult::failed("Limit order requires a price")),
            },
        };

        let main = ExchangeOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            kind,
            amount,
            reduce_only: request.reduce_only,
        };

        let main_order_id = match self.client.create_order(&main).await {
            Ok(order_id) => order_id,
            Err(e) => {
                warn!(
                    "ExchangeBroker: main order failed for {}: {}",
                    request.symbol, e
                );
                return Ok(OrderResult::failed(format!("Order placement failed: {}", e)));
            }
        };
        info!(
            "ExchangeBroker: main order {} accepted ({} {} {})",
            main_order_id, request.side, amount, request.symbol
        );

        // Reduce-only orders close exposure; they never carry protection.
        if request.reduce_only || (request.stop_loss.is_none() && request.take_profit.is_none()) {
            return Ok(OrderResult::ok(main_order_id));
        }

        let protective_side = request.side.opposite();
        let mut result = OrderResult::ok(main_order_id.clone());

        if let Some(stop_price) = request.stop_loss {
            match self
                .place_protective(
                    &request.symbol,
                    protective_side,
                    ExchangeOrderKind::StopMarket(stop_price),
                    amount,
                )
                .await
            {
                Ok(order_id) => result.stop_loss_order_id = Some(order_id),
                Err(_) => return Ok(self.rollback(&request, amount, &main_order_id).await),
            }
        }

        if let Some(take_profit_price) = request.take_profit {
            match self
                .place_protective(
                    &request.symbol,
                    protective_side,
                    ExchangeOrderKind::TakeProfitMarket(take_profit_price),
                    amount,
                )
                .await
            {
                Ok(order_id) => result.take_profit_order_id = Some(order_id),
                Err(e) => {
                    // Stop-loss is in place, so a missing take-profit leaves
                    // the position protected; degrade to a warning.
                    warn!(
                        "ExchangeBroker: take-profit abandoned for {}: {}",
                        request.symbol, e
                    );
                }
            }
        }

        Ok(result)
    }

    async fn get_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>> {
        match self.client.fetch_positions(symbols).await {
            Ok(positions) => Ok(positions
                .into_iter()
                .filter(|p| p.amount > Decimal::ZERO)
                .collect()),
            Err(e) => {
                warn!("ExchangeBroker: position fetch failed: {}", e);
                Ok(vec![])
            }
        }
    }

    async fn get_account_info(&self) -> Result<AccountSnapshot> {
        let balance = match self.client.fetch_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("ExchangeBroker: balance fetch failed: {}", e);
                return Ok(AccountSnapshot::default());
            }
        };

        let total_pnl: Decimal = match self.client.fetch_positions(None).await {
            Ok(positions) => positions.iter().map(|p| p.unrealized_pnl).sum(),
            Err(e) => {
                warn!("ExchangeBroker: position fetch for PnL failed: {}", e);
                Decimal::ZERO
            }
        };

        Ok(AccountSnapshot {
            balance: balance.free + balance.used + total_pnl,
            used_margin: balance.used,
            available_margin: balance.free,
            total_pnl,
            total_margin: balance.free + balance.used,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.client.set_leverage(symbol, leverage).await
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<()> {
        self.client.set_margin_mode(symbol, mode).await
    }
}
