//! End-to-end engine tests driving `Engine` against `SimulatedExchangeAdapter`,
//! the same path the backtest command uses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use grid_engine::config::{Config, DegradeConfig, ExchangeConfig, GridConfig, OperationalConfig};
use grid_engine::engine::{Engine, EngineState};
use grid_engine::exchange::sim::{SimBar, SimulatedExchangeAdapter};
use grid_engine::types::{PortfolioSnapshot, Regime};

fn config() -> Config {
    Config {
        exchange: ExchangeConfig {
            symbol: "BTCINR".to_string(),
            ..ExchangeConfig::default()
        },
        grid: GridConfig {
            support: 84_000.0,
            resistance: 94_000.0,
            regime: Regime::NeutralRange,
            grid_layers_buy: 10,
            grid_layers_sell: 10,
            min_return: 0.001,
            volatility_k: 0.0,
            leverage: 1.0,
            risk_budget_pct: 0.02,
            initial_cash: 100_000.0,
            active_buy_levels: 10,
            enable_mid_shift: false,
            enable_short_in_bearish: false,
            cushion_multiplier: 0.0,
            atr_period: 14,
        },
        degrade: DegradeConfig::default(),
        operational: OperationalConfig::default(),
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

async fn portfolio(adapter: &SimulatedExchangeAdapter) -> PortfolioSnapshot {
    let account = adapter.get_account().await.unwrap();
    let position = adapter.get_position().await.unwrap();
    PortfolioSnapshot::from_parts(account, position)
}

#[tokio::test]
async fn buy_then_sell_fill_round_trips_through_the_reconciler() {
    let adapter = Arc::new(SimulatedExchangeAdapter::new(100_000.0, 0.001));
    let event_log = grid_engine::persistence::EventLog::open_in_memory().unwrap();
    let mut engine = Engine::start(config(), adapter.clone(), event_log, 89_000.0, &[])
        .await
        .unwrap();

    // First tick places the initial BUY ladder.
    engine.tick(at(0), portfolio(&adapter).await, Duration::from_secs(0)).await.unwrap();

    // Drop price through the whole buy ladder to fill it.
    adapter.advance_bar(SimBar {
        timestamp: at(60),
        open: 89_000.0,
        high: 89_000.0,
        low: 84_500.0,
        close: 87_000.0,
    });
    let report = engine
        .tick(at(60), portfolio(&adapter).await, Duration::from_secs(0))
        .await
        .unwrap();
    assert_eq!(report.state, Some(EngineState::Running));

    let position = adapter.get_position().await.unwrap();
    assert!(position.long_qty > 0.0, "expected filled buys to open long lots");

    // Rally back through every paired sell level.
    adapter.advance_bar(SimBar {
        timestamp: at(120),
        open: 87_200.0,
        high: 95_000.0,
        low: 87_200.0,
        close: 90_000.0,
    });
    let report2 = engine
        .tick(at(120), portfolio(&adapter).await, Duration::from_secs(0))
        .await
        .unwrap();

    assert!(report2.realized_pnl > 0.0, "paired sells above cost should realize a profit");

    let final_position = adapter.get_position().await.unwrap();
    assert!(
        final_position.long_qty.abs() < 1e-6,
        "every lot should have been sold; the re-entry buys are pending, not yet filled"
    );

    engine.shutdown(at(180), "test_complete").await.unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn recovery_tick_with_unchanged_position_leaves_ledger_untouched() {
    let adapter = Arc::new(SimulatedExchangeAdapter::new(100_000.0, 0.001));
    let event_log = grid_engine::persistence::EventLog::open_in_memory().unwrap();
    let mut engine = Engine::start(config(), adapter.clone(), event_log, 89_000.0, &[])
        .await
        .unwrap();

    engine.tick(at(0), portfolio(&adapter).await, Duration::from_secs(0)).await.unwrap();
    // No bar advanced: nothing should have filled, a second tick should be a no-op reconcile.
    let report = engine
        .tick(at(60), portfolio(&adapter).await, Duration::from_secs(0))
        .await
        .unwrap();
    assert_eq!(report.realized_pnl, 0.0);

    let position = adapter.get_position().await.unwrap();
    assert_eq!(position.long_qty, 0.0);
}

#[tokio::test]
async fn shutdown_cancels_all_open_orders() {
    let adapter = Arc::new(SimulatedExchangeAdapter::new(100_000.0, 0.001));
    let event_log = grid_engine::persistence::EventLog::open_in_memory().unwrap();
    let mut engine = Engine::start(config(), adapter.clone(), event_log, 89_000.0, &[])
        .await
        .unwrap();

    engine.tick(at(0), portfolio(&adapter).await, Duration::from_secs(0)).await.unwrap();
    assert!(!adapter.list_open_orders().await.unwrap().is_empty());

    engine.shutdown(at(60), "operator_shutdown").await.unwrap();
    assert!(adapter.list_open_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn sustained_unrealized_loss_trips_degraded_and_blocks_recovery_without_reset() {
    let adapter = Arc::new(SimulatedExchangeAdapter::new(100_000.0, 0.001));
    let event_log = grid_engine::persistence::EventLog::open_in_memory().unwrap();
    let mut engine = Engine::start(config(), adapter.clone(), event_log, 89_000.0, &[])
        .await
        .unwrap();

    engine.tick(at(0), portfolio(&adapter).await, Duration::from_secs(0)).await.unwrap();

    assert!(!adapter.list_open_orders().await.unwrap().is_empty());

    let mut bad_portfolio = portfolio(&adapter).await;
    bad_portfolio.unrealized_pnl = -20_000.0;
    let report = engine.tick(at(60), bad_portfolio, Duration::from_secs(0)).await.unwrap();
    assert_eq!(report.state, Some(EngineState::Degraded));

    // Entering degraded cancels every order that was resting on the book.
    assert!(
        adapter.list_open_orders().await.unwrap().is_empty(),
        "degraded state should cancel all open orders"
    );

    // Degraded state persists across ticks until the operator resets it, and
    // no new orders get placed while it does.
    let report2 = engine.tick(at(120), portfolio(&adapter).await, Duration::from_secs(0)).await.unwrap();
    assert_eq!(report2.state, Some(EngineState::Degraded));
    assert!(
        adapter.list_open_orders().await.unwrap().is_empty(),
        "degraded state should not place new orders"
    );

    engine.reset_from_degraded(at(180));
    assert_eq!(engine.state(), EngineState::Running);

    // Recovery resumes placing.
    let report3 = engine.tick(at(180), portfolio(&adapter).await, Duration::from_secs(0)).await.unwrap();
    assert_eq!(report3.state, Some(EngineState::Running));
    assert!(!adapter.list_open_orders().await.unwrap().is_empty());
}
