//! Live trading command: runs the engine loop against `HttpExchangeAdapter`
//! on a fixed tick interval with graceful shutdown on Ctrl+C, cancelling all
//! open orders before the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};

use grid_engine::config::Config;
use grid_engine::engine::Engine;
use grid_engine::exchange::auth::Credentials;
use grid_engine::exchange::http::{HttpClientConfig, HttpExchangeAdapter};
use grid_engine::persistence::EventLog;
use grid_engine::types::PortfolioSnapshot;

pub async fn run(config_path: String, db_path: String, current_price: f64) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let api_key = config
        .exchange
        .api_key
        .clone()
        .context("missing EXCHANGE_API_KEY")?;
    let api_secret = config
        .exchange
        .api_secret
        .clone()
        .context("missing EXCHANGE_API_SECRET")?;
    let credentials = Credentials::new(api_key, api_secret);

    let client_config = HttpClientConfig {
        symbol: config.exchange.symbol.clone(),
        ..HttpClientConfig::default()
    }
    .with_max_retries(config.exchange.max_retries)
    .with_rate_limit(config.exchange.rate_limit_per_sec)
    .with_timeout(Duration::from_secs(30));

    let adapter = Arc::new(HttpExchangeAdapter::new(credentials, client_config));
    let event_log = EventLog::open(&db_path).context("Failed to open event log")?;

    warn!("LIVE TRADING MODE - real funds at risk");
    warn!("Press Ctrl+C within 10 seconds to abort...");
    for i in (1..=10).rev() {
        info!("Starting in {} seconds...", i);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let mut engine = Engine::start(config.clone(), adapter.clone(), event_log, current_price, &[])
        .await
        .context("Failed to start engine")?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => error!("Error setting up signal handler: {}", e),
        }
    });

    let mut tick_interval = interval(Duration::from_secs(config.operational.bar_interval_secs));
    info!("Starting trading loop...");

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    break;
                }

                let account = match adapter.get_account().await {
                    Ok(a) => a,
                    Err(e) => {
                        error!(error = %e, "failed to refresh account, skipping this tick");
                        continue;
                    }
                };
                let position = match adapter.get_position().await {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = %e, "failed to refresh position, skipping this tick");
                        continue;
                    }
                };
                let portfolio = PortfolioSnapshot::from_parts(account, position);

                if let Err(e) = engine.tick(chrono::Utc::now(), portfolio, Duration::from_secs(0)).await {
                    error!(error = %e, "tick failed");
                    if e.is_fatal() {
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    engine.shutdown(chrono::Utc::now(), "operator_shutdown").await?;
    info!("Live trading session ended.");
    Ok(())
}
