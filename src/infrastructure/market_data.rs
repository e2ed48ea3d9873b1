//! Market data collaborators behind the `MarketDataFeed` port.
//!
//! The feed returns one pre-formatted string per symbol; the agent core
//! passes it through to the model untouched.

use crate::domain::ports::MarketDataFeed;
use crate::domain::trading::types::Candle;
use crate::infrastructure::exchange::binance::BinanceFuturesClient;
use crate::infrastructure::simulation::SimulationBroker;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

const CANDLE_INTERVAL: &str = "15m";
const CANDLE_LIMIT: u32 = 16;

/// Exchange-backed feed: venue last price plus recent OHLCV history.
pub struct ExchangeMarketDataFeed {
    client: Arc<BinanceFuturesClient>,
}

impl ExchangeMarketDataFeed {
    pub fn new(client: Arc<BinanceFuturesClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketDataFeed for ExchangeMarketDataFeed {
    async fn snapshot(&self, symbol: &str) -> Result<String> {
        use crate::domain::ports::ExchangeClient;

        let last_price = self.client.last_price(symbol).await?;
        let candles = self
            .client
            .recent_candles(symbol, CANDLE_INTERVAL, CANDLE_LIMIT)
            .await
            .unwrap_or_default();

        Ok(format_snapshot(symbol, last_price, &candles))
    }
}

fn format_snapshot(symbol: &str, last_price: Decimal, candles: &[Candle]) -> String {
    let mut out = format!(
        "Market data for {symbol}\nLast price: {last_price} USDT\nTimestamp: {}\n",
        chrono::Utc::now().to_rfc3339()
    );

    if candles.is_empty() {
        return out;
    }

    let first_open = candles[0].open;
    if first_open > Decimal::ZERO {
        let change = (last_price - first_open) / first_open * Decimal::from(100);
        out.push_str(&format!(
            "Change over the last {} candles ({}): {:.2}%\n",
            candles.len(),
            CANDLE_INTERVAL,
            change
        ));
    }

    out.push_str("Recent candles (open high low close volume):\n");
    for candle in candles {
        out.push_str(&format!(
            "  {} {} {} {} {} {}\n",
            candle.open_time, candle.open, candle.high, candle.low, candle.close, candle.volume
        ));
    }
    out
}

/// Mock-mode feed reading the simulator's drifting prices, so market data
/// and fills stay coherent in a mock run.
pub struct SimulatedMarketDataFeed {
    broker: Arc<SimulationBroker>,
}

impl SimulatedMarketDataFeed {
    pub fn new(broker: Arc<SimulationBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl MarketDataFeed for SimulatedMarketDataFeed {
    async fn snapshot(&self, symbol: &str) -> Result<String> {
        let last_price = self.broker.last_price(symbol).await;
        Ok(format!(
            "Market data for {symbol} (simulated)\nLast price: {last_price} USDT\n\
             Timestamp: {}",
            chrono::Utc::now().to_rfc3339()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_simulated_snapshot_contains_seeded_price() {
        let broker = Arc::new(SimulationBroker::new_deterministic(dec!(1000)));
        broker.seed_price("BTC/USDT", dec!(96000)).await;

        let feed = SimulatedMarketDataFeed::new(broker);
        let snapshot = feed.snapshot("BTC/USDT").await.unwrap();
        assert!(snapshot.contains("BTC/USDT"));
        assert!(snapshot.contains("96000"));
    }

    #[test]
    fn test_format_snapshot_includes_change_and_candles() {
        let candles = vec![
            Candle {
                open: dec!(95000),
                high: dec!(96100),
                low: dec!(94900),
                close: dec!(96000),
                volume: dec!(12.5),
                open_time: 1_700_000_000_000,
            },
            Candle {
                open: dec!(96000),
                high: dec!(96600),
                low: dec!(95900),
                close: dec!(96500),
                volume: dec!(9.1),
                open_time: 1_700_000_900_000,
            },
        ];
        let snapshot = format_snapshot("BTC/USDT", dec!(96500), &candles);
        assert!(snapshot.contains("Last price: 96500"));
        assert!(snapshot.contains("Recent candles"));
        // (96500 - 95000) / 95000 ~= 1.58%
        assert!(snapshot.contains("1.58%"));
    }

    #[test]
    fn test_format_snapshot_without_candles_is_price_only() {
        let snapshot = format_snapshot("ETH/USDT", dec!(3800), &[]);
        assert!(snapshot.contains("Last price: 3800"));
        assert!(!snapshot.contains("Recent candles"));
    }
}
