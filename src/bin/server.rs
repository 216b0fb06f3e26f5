//! Signalforge server - headless signal engine.
//!
//! Runs the tick loop without any UI. Metrics are pushed as structured
//! logs to stdout - no HTTP server, no incoming connections. Exchange and
//! notification adapters are wired here; `--mock` runs against scripted
//! market data for local smoke testing.
//!
//! # Usage
//! ```sh
//! DATABASE_URL=sqlite://data/signalforge.db cargo run --bin server
//! cargo run --bin server -- --mock
//! ```

use anyhow::Result;
use clap::Parser;
use signalforge::application::system::Engine;
use signalforge::config::Config;
use signalforge::domain::ports::{ExchangePort, NotificationPort, PersistencePort};
use signalforge::domain::types::Interval;
use signalforge::infrastructure::{
    Database, InMemoryPersistence, MockExchange, MockNotifier, SqlitePersistence,
};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "signalforge-server", about = "Headless crypto-futures signal engine")]
struct Args {
    /// Run against the scripted mock exchange and notifier.
    #[arg(long)]
    mock: bool,

    /// Override DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Signalforge {} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env()?;
    if let Some(url) = args.database_url.as_deref() {
        config.database_url = url.to_string();
    }
    info!(
        "Universe: {:?} @ {}, users: {:?}",
        config.universe.symbols, config.universe.interval, config.subscribed_users
    );

    if !args.mock {
        // Real adapters (exchange REST/WS client, Telegram delivery) are
        // deployed as sidecar services implementing the engine ports; the
        // engine binary itself never speaks HTTP. Mock mode is the only
        // in-process wiring.
        anyhow::bail!("No in-process exchange adapter; run with --mock");
    }

    let (exchange, notifier): (Arc<dyn ExchangePort>, Arc<dyn NotificationPort>) = {
        info!("Mode: MOCK (scripted exchange, recording notifier)");
        let exchange = MockExchange::new();
        let now = chrono::Utc::now().timestamp();
        for symbol in &config.universe.symbols {
            exchange
                .seed_ramp(symbol, config.universe.interval, 200, 100.0, 0.2, now)
                .await;
            exchange
                .seed_ramp(symbol, config.universe.htf_interval, 80, 100.0, 0.6, now)
                .await;
        }
        if !config.universe.symbols.iter().any(|s| s == "BTCUSDT") {
            exchange
                .seed_ramp("BTCUSDT", config.universe.interval, 200, 50_000.0, 0.2, now)
                .await;
            exchange
                .seed_ramp("BTCUSDT", Interval::H4, 80, 50_000.0, 0.6, now)
                .await;
        }
        (Arc::new(exchange), Arc::new(MockNotifier::new()))
    };

    // Durable storage when a database is configured, in-memory otherwise.
    let persistence: Arc<dyn PersistencePort> =
        if std::env::var("DATABASE_URL").is_ok() || args.database_url.is_some() {
            let database = connect_with_retries(&config.database_url).await?;
            Arc::new(SqlitePersistence::new(database.pool))
        } else {
            Arc::new(InMemoryPersistence::new())
        };

    let engine = Engine::build(config, exchange, notifier, persistence).await?;
    let handle = engine.start();
    info!("Engine running. Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    Ok(())
}

/// Storage being down must not start ticks; keep reconnecting with
/// backoff and only give up after a long stretch so the supervisor sees a
/// clean failure.
async fn connect_with_retries(database_url: &str) -> Result<Database> {
    let mut backoff = std::time::Duration::from_secs(1);
    for attempt in 1..=10 {
        match Database::new(database_url).await {
            Ok(database) => return Ok(database),
            Err(e) if attempt < 10 => {
                tracing::warn!(
                    "Database connect attempt {} failed ({:#}), retrying in {:?}",
                    attempt,
                    e,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(std::time::Duration::from_secs(60));
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop either returns or errors on the final attempt")
}
