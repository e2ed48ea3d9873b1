//! Cached view of open positions.
//!
//! Reads go through an in-memory map refreshed from the broker at most once
//! per cooldown window; anything that just traded calls `force_sync` to see
//! post-trade state immediately.

use crate::domain::ports::Broker;
use crate::domain::trading::types::{Position, PositionSide, normalize_symbol};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEFAULT_SYNC_COOLDOWN: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_POSITIONS: usize = 5;

struct CacheState {
    positions: HashMap<String, Position>,
    last_sync: Option<Instant>,
}

pub struct PositionManager {
    broker: Arc<dyn Broker>,
    state: RwLock<CacheState>,
    sync_cooldown: Duration,
}

impl PositionManager {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_cooldown(broker, DEFAULT_SYNC_COOLDOWN)
    }

    pub fn with_cooldown(broker: Arc<dyn Broker>, sync_cooldown: Duration) -> Self {
        Self {
            broker,
            state: RwLock::new(CacheState {
                positions: HashMap::new(),
                last_sync: None,
            }),
            sync_cooldown,
        }
    }

    /// Refreshes the cache from the broker unless a sync happened within the
    /// cooldown window. Passing `symbols` evicts and replaces only those
    /// keys; `None` replaces the whole map.
    pub async fn sync_positions(&self, symbols: Option<&[String]>) {
        {
            let state = self.state.read().await;
            if let Some(last) = state.last_sync
                && last.elapsed() < self.sync_cooldown
            {
                return;
            }
        }
        self.force_sync(symbols).await;
    }

    /// Refreshes the cache regardless of cooldown. Used after every trade so
    /// the next read observes post-trade state.
    pub async fn force_sync(&self, symbols: Option<&[String]>) {
        let fetched = match self.broker.get_positions(symbols).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!("PositionManager: position sync failed: {}", e);
                return;
            }
        };

        let mut state = self.state.write().await;
        match symbols {
            Some(symbols) => {
                for symbol in symbols {
                    state.positions.remove(&normalize_symbol(symbol));
                }
            }
            None => state.positions.clear(),
        }
        for position in fetched {
            state
                .positions
                .insert(position.symbol.clone(), position);
        }
        state.last_sync = Some(Instant::now());
    }

    pub async fn get_position(&self, symbol: &str) -> Option<Position> {
        let state = self.state.read().await;
        state.positions.get(&normalize_symbol(symbol)).cloned()
    }

    pub async fn has_position(&self, symbol: &str) -> bool {
        self.get_position(symbol).await.is_some()
    }

    pub async fn has_long_position(&self, symbol: &str) -> bool {
        matches!(
            self.get_position(symbol).await,
            Some(Position { side: PositionSide::Long, .. })
        )
    }

    pub async fn has_short_position(&self, symbol: &str) -> bool {
        matches!(
            self.get_position(symbol).await,
            Some(Position { side: PositionSide::Short, .. })
        )
    }

    pub async fn get_all_positions(&self) -> Vec<Position> {
        let state = self.state.read().await;
        state.positions.values().cloned().collect()
    }

    pub async fn get_position_count(&self) -> usize {
        let state = self.state.read().await;
        state.positions.len()
    }

    pub async fn get_total_unrealized_pnl(&self) -> Decimal {
        let state = self.state.read().await;
        state
            .positions
            .values()
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    pub async fn get_total_margin_used(&self) -> Decimal {
        let state = self.state.read().await;
        state.positions.values().map(|p| p.margin_used()).sum()
    }

    /// Admission control for opening actions: one position per symbol, at
    /// most `max_positions` overall.
    pub async fn can_open_position(&self, symbol: &str, max_positions: usize) -> bool {
        let state = self.state.read().await;
        if state.positions.contains_key(&normalize_symbol(symbol)) {
            info!(
                "PositionManager: {} already has an open position, denying open",
                symbol
            );
            return false;
        }
        if state.positions.len() >= max_positions {
            info!(
                "PositionManager: position limit reached ({}/{}), denying open for {}",
                state.positions.len(),
                max_positions,
                symbol
            );
            return false;
        }
        true
    }

    /// True when the cached position is losing more than `max_loss_percent`
    /// of its notional entry value.
    pub async fn should_close_position(&self, symbol: &str, max_loss_percent: f64) -> bool {
        let Some(position) = self.get_position(symbol).await else {
            return false;
        };
        if position.unrealized_pnl >= Decimal::ZERO {
            return false;
        }
        let notional = position.amount * position.entry_price;
        if notional <= Decimal::ZERO {
            return false;
        }
        let loss_ratio = (-position.unrealized_pnl / notional).to_f64().unwrap_or(0.0);
        loss_ratio > max_loss_percent
    }
}
