//! Backtest command: replays historical candles through the engine loop
//! against `SimulatedExchangeAdapter`, the same grid/ledger/fill-handler/
//! safety-gate code path live trading uses.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use grid_engine::config::Config;
use grid_engine::data;
use grid_engine::engine::Engine;
use grid_engine::exchange::sim::{SimBar, SimulatedExchangeAdapter};
use grid_engine::persistence::EventLog;
use grid_engine::types::PortfolioSnapshot;

pub async fn run(config_path: String, data_path: String, db_path: Option<String>) -> Result<()> {
    info!("Starting backtest");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let candles = data::load_csv(&data_path).context("Failed to load candle data")?;
    anyhow::ensure!(!candles.is_empty(), "no candles loaded from {}", data_path);

    let warmup = config.grid.atr_period.max(1).min(candles.len());
    let (warmup_candles, remaining) = candles.split_at(warmup);
    anyhow::ensure!(!remaining.is_empty(), "not enough candles after the ATR warmup window");

    let adapter = Arc::new(SimulatedExchangeAdapter::new(
        config.grid.initial_cash,
        config.exchange.maker_fee,
    ));
    let event_log = match db_path {
        Some(path) => EventLog::open(&path).context("Failed to open event log")?,
        None => EventLog::open_in_memory().context("Failed to open in-memory event log")?,
    };

    let current_price = warmup_candles.last().map(|c| c.close).unwrap_or(remaining[0].open);
    let mut engine = Engine::start(config, adapter.clone(), event_log, current_price, warmup_candles)
        .await
        .context("Failed to start engine")?;

    let mut realized_pnl = 0.0;
    let mut ticks = 0u64;
    let mut last_now = warmup_candles.last().map(|c| c.datetime).unwrap_or_else(chrono::Utc::now);

    for candle in remaining {
        adapter.advance_bar(SimBar {
            timestamp: candle.datetime,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
        });

        let account = adapter.get_account().await?;
        let position = adapter.get_position().await?;
        let portfolio = PortfolioSnapshot::from_parts(account, position);

        let report = engine
            .tick(candle.datetime, portfolio, std::time::Duration::from_secs(0))
            .await?;
        realized_pnl += report.realized_pnl;
        ticks += 1;
        last_now = candle.datetime;
    }

    engine.shutdown(last_now, "backtest_complete").await?;

    let final_account = adapter.get_account().await?;
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Bars processed:      {}", ticks);
    println!("Final equity:        {:.2}", final_account.equity);
    println!("Final cash:          {:.2}", final_account.cash);
    println!("Realized PnL (grid): {:.2}", realized_pnl);
    println!("{}", "=".repeat(60));

    info!("Backtest completed");
    Ok(())
}
