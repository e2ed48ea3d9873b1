//! Bootstrap wiring.
//!
//! Builds the object graph once per process: one broker, one position
//! manager, one tool set, all shared through `Arc`s so every tool and the
//! scheduler observe the same state. Tests bypass this and wire mocks
//! directly.

use crate::application::agent::TradingAgent;
use crate::application::agent::tools::ToolSet;
use crate::application::audit::AuditSink;
use crate::application::position_manager::PositionManager;
use crate::application::scheduler::Scheduler;
use crate::config::{BrokerMode, Config};
use crate::domain::ports::{Broker, MarketDataFeed, SearchProvider, SessionRepository};
use crate::domain::risk::guard::RiskGuard;
use crate::infrastructure::exchange::ExchangeBroker;
use crate::infrastructure::exchange::binance::BinanceFuturesClient;
use crate::infrastructure::llm::OpenAiDriver;
use crate::infrastructure::market_data::{ExchangeMarketDataFeed, SimulatedMarketDataFeed};
use crate::infrastructure::persistence::{Database, SqliteSessionRepository};
use crate::infrastructure::search::HttpSearchProvider;
use crate::infrastructure::simulation::SimulationBroker;
use anyhow::Result;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MOCK_INITIAL_BALANCE: rust_decimal::Decimal = dec!(10000);

pub struct Application {
    scheduler: Scheduler,
    agent: Arc<TradingAgent>,
    symbols: Vec<String>,
    interval: Duration,
    jitter: Duration,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        let (broker, market_data): (Arc<dyn Broker>, Arc<dyn MarketDataFeed>) =
            match config.broker_mode {
                BrokerMode::Mock => {
                    info!("Application: using the simulation broker");
                    let simulator = Arc::new(SimulationBroker::new(MOCK_INITIAL_BALANCE));
                    let feed = Arc::new(SimulatedMarketDataFeed::new(simulator.clone()));
                    (simulator, feed)
                }
                BrokerMode::Paper | BrokerMode::Live => {
                    info!(
                        "Application: using the exchange broker against {}",
                        config.exchange.base_url
                    );
                    let client = Arc::new(BinanceFuturesClient::new(
                        config.exchange.api_key.clone(),
                        config.exchange.api_secret.clone(),
                        config.exchange.base_url.clone(),
                    ));
                    let broker = Arc::new(ExchangeBroker::new(client.clone()));
                    let feed = Arc::new(ExchangeMarketDataFeed::new(client));
                    (broker, feed)
                }
            };

        let positions = Arc::new(PositionManager::new(broker.clone()));
        let risk_guard = Arc::new(RiskGuard::new(config.risk.clone()));

        let search: Option<Arc<dyn SearchProvider>> =
            match HttpSearchProvider::from_config(&config.search) {
                Some(provider) => Some(Arc::new(provider)),
                None => {
                    info!("Application: search provider not configured");
                    None
                }
            };

        // Audit degrades to file-only when the database is unreachable;
        // trading does not depend on it.
        let repository: Option<Arc<dyn SessionRepository>> =
            match Database::new(&config.database_url).await {
                Ok(database) => Some(Arc::new(SqliteSessionRepository::new(database.pool.clone()))),
                Err(e) => {
                    warn!("Application: relational audit disabled: {:#}", e);
                    None
                }
            };
        let audit = Arc::new(AuditSink::new(config.log_dir.clone(), repository));

        let completer = Arc::new(OpenAiDriver::new(&config.llm));
        let toolset = Arc::new(ToolSet::new(
            broker,
            positions,
            risk_guard.clone(),
            market_data,
            search,
        ));
        let agent = Arc::new(TradingAgent::new(completer, toolset, risk_guard, audit));

        Ok(Self {
            scheduler: Scheduler::new(),
            agent,
            symbols: config.risk.symbols.clone(),
            interval: Duration::from_millis(config.risk.interval_ms),
            jitter: Duration::from_millis(config.risk.jitter_ms),
        })
    }

    /// Runs exactly one cycle and returns; the `--once` path.
    pub async fn run_once(&self) {
        self.scheduler
            .run_once(self.agent.clone(), &self.symbols)
            .await;
    }

    /// Runs the scheduler until SIGINT or SIGTERM. The in-progress cycle is
    /// allowed to finish before this returns.
    pub async fn run_until_signal(&self) {
        self.scheduler
            .start(
                self.agent.clone(),
                self.symbols.clone(),
                self.interval,
                self.jitter,
                shutdown_signal(),
            )
            .await;
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Application: SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
