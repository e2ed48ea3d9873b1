//! End-to-end tool dispatch against the deterministic simulator.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tradepilot::application::agent::tools::{TOOL_PLACE_ORDER, ToolInvocation, ToolSet};
use tradepilot::application::position_manager::PositionManager;
use tradepilot::domain::risk::config::{RiskConfig, TradingMode};
use tradepilot::domain::risk::guard::RiskGuard;
use tradepilot::domain::trading::types::PositionSide;
use tradepilot::infrastructure::market_data::SimulatedMarketDataFeed;
use tradepilot::infrastructure::simulation::SimulationBroker;

fn risk_config(whitelist: Vec<&str>) -> RiskConfig {
    RiskConfig::new(
        TradingMode::Paper,
        10,
        dec!(100),
        whitelist.into_iter().map(String::from).collect(),
        0.01,
        0.05,
        0.10,
        300_000,
        300_000,
        15_000,
        vec![],
    )
    .unwrap()
}

struct Fixture {
    broker: Arc<SimulationBroker>,
    positions: Arc<PositionManager>,
    toolset: ToolSet,
}

fn fixture(whitelist: Vec<&str>) -> Fixture {
    let broker = Arc::new(SimulationBroker::new_deterministic(dec!(10000)));
    let positions = Arc::new(PositionManager::new(broker.clone()));
    let toolset = ToolSet::new(
        broker.clone(),
        positions.clone(),
        Arc::new(RiskGuard::new(risk_config(whitelist))),
        Arc::new(SimulatedMarketDataFeed::new(broker.clone())),
        None,
    );
    Fixture {
        broker,
        positions,
        toolset,
    }
}

async fn place(toolset: &ToolSet, arguments: &str) -> serde_json::Value {
    let invocation = ToolInvocation::parse(TOOL_PLACE_ORDER, arguments).unwrap();
    toolset.execute(invocation).await
}

#[tokio::test]
async fn test_open_long_with_stop_loss_succeeds() {
    let f = fixture(vec!["BTC/USDT"]);
    f.broker.seed_price("BTC/USDT", dec!(100000)).await;

    let result = place(
        &f.toolset,
        r#"{"symbol":"BTC/USDT","action":"open_long","cost":100,"leverage":5,"stop_loss":95000}"#,
    )
    .await;

    assert_eq!(result["success"], true, "unexpected result: {}", result);
    assert!(result["stopLossOrderId"].is_string());

    // The bridge force-synced, so the cache already shows the position.
    let position = f.positions.get_position("BTC/USDT").await.unwrap();
    assert_eq!(position.side, PositionSide::Long);
    assert_eq!(position.leverage, 5);
    // 100 USDT * 5x at 100k -> 0.005 BTC
    assert_eq!(position.amount, dec!(0.005));
    assert_eq!(f.positions.get_position_count().await, 1);
}

#[tokio::test]
async fn test_open_rejected_for_unlisted_symbol_without_broker_call() {
    let f = fixture(vec!["BTC/USDT"]);

    let result = place(
        &f.toolset,
        r#"{"symbol":"DOGE/USDT","action":"open_long","cost":10,"leverage":2}"#,
    )
    .await;

    assert_eq!(result["success"], false);
    assert_eq!(result["rejected"], true);
    // No order reached the simulator.
    assert!(f.broker.state().await.positions.is_empty());
    assert_eq!(f.positions.get_position_count().await, 0);
}

#[tokio::test]
async fn test_close_long_without_position_is_an_error() {
    let f = fixture(vec!["BTC/USDT", "ETH/USDT"]);

    let result = place(&f.toolset, r#"{"symbol":"ETH/USDT","action":"close_long"}"#).await;

    assert_eq!(result["success"], false);
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .contains("No long position")
    );
    assert!(f.broker.state().await.positions.is_empty());
}

#[tokio::test]
async fn test_close_long_requires_matching_side() {
    let f = fixture(vec!["BTC/USDT"]);
    place(
        &f.toolset,
        r#"{"symbol":"BTC/USDT","action":"open_short","cost":50,"leverage":2}"#,
    )
    .await;

    let result = place(&f.toolset, r#"{"symbol":"BTC/USDT","action":"close_long"}"#).await;
    assert_eq!(result["success"], false);
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .contains("No long position")
    );
    // The short is untouched.
    assert_eq!(f.broker.state().await.positions.len(), 1);
}

#[tokio::test]
async fn test_cache_matches_broker_after_open_and_close() {
    let f = fixture(vec!["BTC/USDT"]);
    f.broker.seed_price("BTC/USDT", dec!(100000)).await;

    place(
        &f.toolset,
        r#"{"symbol":"BTC/USDT","action":"open_long","cost":100,"leverage":5}"#,
    )
    .await;
    assert!(f.positions.has_long_position("BTC/USDT").await);
    assert_eq!(f.broker.state().await.positions.len(), 1);

    let result = place(&f.toolset, r#"{"symbol":"BTC/USDT","action":"close_long"}"#).await;
    assert_eq!(result["success"], true);

    // Cache and broker agree the position is gone.
    assert!(!f.positions.has_position("BTC/USDT").await);
    assert!(f.broker.state().await.positions.is_empty());
}

#[tokio::test]
async fn test_open_requires_cost_and_leverage() {
    let f = fixture(vec!["BTC/USDT"]);

    let result = place(&f.toolset, r#"{"symbol":"BTC/USDT","action":"open_long"}"#).await;
    assert_eq!(result["success"], false);
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .contains("cost and leverage")
    );
}

#[tokio::test]
async fn test_account_info_reflects_post_trade_state() {
    let f = fixture(vec!["BTC/USDT"]);
    f.broker.seed_price("BTC/USDT", dec!(100000)).await;
    place(
        &f.toolset,
        r#"{"symbol":"BTC/USDT","action":"open_long","cost":100,"leverage":5}"#,
    )
    .await;

    let invocation = tradepilot::application::agent::tools::ToolInvocation::parse(
        "get_account_info",
        r#"{"symbols":["BTC/USDT"],"initial_capital":10000}"#,
    )
    .unwrap();
    let result = f.toolset.execute(invocation).await;

    assert_eq!(result["success"], true);
    assert_eq!(result["openPositions"].as_array().unwrap().len(), 1);
    assert!(result["totalReturnPct"].is_number() || result["totalReturnPct"].is_null());
}
