use clap::Parser;
use tradepilot::application::system::Application;
use tradepilot::config::{BrokerMode, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// LLM-driven crypto futures trading agent.
#[derive(Parser, Debug)]
#[command(name = "tradepilot", version, about)]
struct Cli {
    /// Development mode: force the simulation broker regardless of env.
    #[arg(long)]
    dev: bool,

    /// Run exactly one trading cycle, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if cli.dev {
        config.broker_mode = BrokerMode::Mock;
    }

    if let Err(e) = config.require_credentials() {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!(
        "tradepilot {} starting (mode: {}, broker: {:?}, symbols: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.trading_mode,
        config.broker_mode,
        config.risk.symbols
    );

    let app = match Application::build(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to build application: {:#}", e);
            std::process::exit(1);
        }
    };

    if cli.once {
        app.run_once().await;
        info!("Single cycle complete.");
    } else {
        app.run_until_signal().await;
        info!("Shutdown complete.");
    }
}
