//! Engine loop: the single-threaded cooperative scheduler that owns the
//! grid manager, ledger, and reconciler for one trading session and drives
//! them one tick per bar. Live and backtest drivers both call [`Engine::tick`];
//! only how fills arrive underneath the exchange adapter differs between them.

pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventKind, EventTrigger};
use crate::exchange::ExchangeAdapter;
use crate::grid::generator;
use crate::grid::ledger::InventoryLedger;
use crate::grid::manager::GridManager;
use crate::grid::reconciler::Reconciler;
use crate::persistence::EventLog;
use crate::types::{Candle, PortfolioSnapshot};

pub use state::EngineState;

/// Everything produced by one tick, for the driver to log or assert on.
#[derive(Debug, Default)]
pub struct TickReport {
    pub realized_pnl: f64,
    pub state: Option<EngineState>,
}

pub struct Engine {
    config: Config,
    adapter: Arc<dyn ExchangeAdapter>,
    event_log: EventLog,
    session_id: Uuid,
    manager: GridManager,
    ledger: InventoryLedger,
    reconciler: Reconciler,
    state: EngineState,
    last_tick_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    orders_placed: u64,
    orders_cancelled: u64,
}

impl Engine {
    /// Session startup: query the current position, build the ladder around
    /// the resolved center, set one-way mode, and open the session record.
    /// A failure to query the starting position or set one-way mode is
    /// fatal — the session refuses to start rather than trade blind.
    pub async fn start(
        config: Config,
        adapter: Arc<dyn ExchangeAdapter>,
        event_log: EventLog,
        current_price: f64,
        recent_candles: &[Candle],
    ) -> EngineResult<Self> {
        config
            .validate()
            .map_err(EngineError::InvalidConfig)?;

        adapter
            .ensure_one_way_mode()
            .await
            .map_err(|_| EngineError::OneWayModeUnavailable)?;

        let position = adapter
            .get_position()
            .await
            .map_err(|e| EngineError::StartupPositionQueryFailed(e.to_string()))?;

        let high: Vec<f64> = recent_candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = recent_candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = recent_candles.iter().map(|c| c.close).collect();
        let atr_value = generator::atr_over(&high, &low, &close, config.grid.atr_period);

        let center = generator::resolve_center(
            current_price,
            config.grid.support,
            config.grid.resistance,
            atr_value,
            config.grid.cushion_multiplier,
            config.grid.enable_mid_shift,
        );

        let manager = GridManager::setup(center, &config.grid, config.exchange.maker_fee, atr_value);
        let mut ledger = InventoryLedger::new();
        if position.long_qty > 1e-12 {
            // Seed the ledger with the exchange-reported starting position
            // as a single lot at level 0 so cost-basis accounting has a
            // starting point even though its per-level origin is unknown.
            ledger.add_lot(0, position.long_qty, position.avg_entry_price, Utc::now());
        }

        let session_id = Uuid::new_v4();
        let config_snapshot = serde_json::to_string(&config).unwrap_or_default();
        event_log
            .open_session(session_id, Utc::now(), &config_snapshot)
            .map_err(EngineError::Persistence)?;

        info!(%session_id, center, atr_value, "engine session started");

        Ok(Self {
            config,
            adapter,
            event_log,
            session_id,
            manager,
            ledger,
            reconciler: Reconciler::new(session_id),
            state: EngineState::Starting,
            last_tick_at: None,
            consecutive_failures: 0,
            orders_placed: 0,
            orders_cancelled: 0,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// One tick of the cooperative scheduler:
    /// 1. Advance the clock and refresh the portfolio snapshot, checking
    ///    data staleness against the degrade threshold.
    /// 2. Reconcile the intended-order table against the exchange — this is
    ///    where fills surface, for both drivers: live orders disappear and
    ///    are recovered via `query_order`, and the backtest driver's
    ///    `SimulatedExchangeAdapter` fills orders against bar OHLC using the
    ///    identical trigger rule before this tick runs, so the same
    ///    disappeared-order path picks them up. The engine never branches on
    ///    which adapter it holds.
    /// 3. Persist a snapshot and append this tick's events.
    /// 4. Check degrade conditions and transition state if needed.
    pub async fn tick(
        &mut self,
        now: DateTime<Utc>,
        portfolio: PortfolioSnapshot,
        data_age: std::time::Duration,
    ) -> EngineResult<TickReport> {
        if self.state == EngineState::Starting {
            self.transition(EngineState::Running, now);
        }

        if data_age > std::time::Duration::from_secs(self.config.degrade.data_staleness_secs) {
            warn!(?data_age, "market data stale beyond degrade threshold");
            self.enter_degraded(now, "data_staleness_exceeded").await;
        }

        let mut report = TickReport::default();

        let reconcile = self
            .reconciler
            .reconcile(
                &mut self.manager,
                &mut self.ledger,
                self.adapter.as_ref(),
                portfolio.equity,
                portfolio.long_holdings,
                portfolio.short_holdings,
                self.config.grid.leverage,
                0.05,
                self.config.operational.eps_sell,
                self.config.operational.eps_fill,
                self.config.exchange.maker_fee,
                now,
                self.state == EngineState::Running,
            )
            .await;
        report.realized_pnl += reconcile.realized_pnl;
        for event in &reconcile.events {
            self.append_event(event);
            match event.event_type {
                EventKind::Submitted => self.orders_placed += 1,
                EventKind::Cancelled => self.orders_cancelled += 1,
                EventKind::SafetyBlock => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                }
                _ => {}
            }
        }
        if !reconcile.events.iter().any(|e| e.event_type == EventKind::SafetyBlock) {
            self.consecutive_failures = 0;
        }

        if portfolio.unrealized_pnl < 0.0
            && portfolio.equity > 0.0
            && (-portfolio.unrealized_pnl / portfolio.equity) > self.config.degrade.max_unrealized_loss_pct
        {
            self.enter_degraded(now, "unrealized_loss_exceeded").await;
        }
        let inventory_notional = self.ledger.cost_basis();
        if portfolio.equity > 0.0 && inventory_notional / portfolio.equity > self.config.degrade.max_inventory_ratio {
            self.enter_degraded(now, "inventory_ratio_exceeded").await;
        }
        if self.consecutive_failures >= self.config.degrade.consecutive_failure_limit {
            self.enter_degraded(now, "consecutive_failure_limit_exceeded").await;
        }

        let snapshot = serde_json::json!({
            "long_exposure": self.ledger.long_exposure(),
            "cost_basis": self.ledger.cost_basis(),
            "equity": portfolio.equity,
            "state": format!("{:?}", self.state),
        });
        self.event_log
            .write_snapshot(
                &self.config.exchange.symbol,
                "portfolio",
                &snapshot.to_string(),
                now,
            )
            .map_err(EngineError::Persistence)?;

        self.last_tick_at = Some(now);
        report.state = Some(self.state);
        Ok(report)
    }

    /// Cancel every live order and close the session record. Called on
    /// `STOPPING`; idempotent if called twice.
    pub async fn shutdown(&mut self, now: DateTime<Utc>, reason: &str) -> EngineResult<()> {
        self.transition(EngineState::Stopping, now);

        match self.adapter.list_open_orders().await {
            Ok(orders) => {
                for order in orders {
                    if let Err(e) = self.adapter.cancel_order(&order.exchange_order_id).await {
                        error!(error = %e, order = %order.exchange_order_id, "failed to cancel order during shutdown");
                    } else {
                        self.orders_cancelled += 1;
                    }
                }
            }
            Err(e) => error!(error = %e, "failed to list open orders during shutdown"),
        }

        self.event_log
            .close_session(self.session_id, now, reason, self.orders_cancelled, self.orders_placed)
            .map_err(EngineError::Persistence)?;

        self.transition(EngineState::Stopped, now);
        Ok(())
    }

    /// Operator-triggered recovery out of `DEGRADED` back into `RUNNING`.
    pub fn reset_from_degraded(&mut self, now: DateTime<Utc>) {
        if self.state == EngineState::Degraded {
            self.consecutive_failures = 0;
            self.transition(EngineState::Running, now);
        }
    }

    /// Stops the ladder and flattens no new risk: cancels every live order so
    /// nothing is left resting while placing is suppressed, but leaves fill
    /// recovery in `reconcile` running so existing fills still get drained.
    async fn enter_degraded(&mut self, now: DateTime<Utc>, reason: &str) {
        if self.state == EngineState::Running {
            warn!(reason, "entering degraded state");
            self.transition(EngineState::Degraded, now);

            match self.adapter.list_open_orders().await {
                Ok(orders) => {
                    for order in orders {
                        if let Err(e) = self.adapter.cancel_order(&order.exchange_order_id).await {
                            error!(error = %e, order = %order.exchange_order_id, "failed to cancel order while entering degraded state");
                        } else {
                            self.orders_cancelled += 1;
                        }
                    }
                }
                Err(e) => error!(error = %e, "failed to list open orders while entering degraded state"),
            }

            let event = EngineEvent::new(self.session_id, now, EventKind::Drift, EventTrigger::Sync, reason.to_string());
            self.append_event(&event);
        }
    }

    fn transition(&mut self, next: EngineState, _now: DateTime<Utc>) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            error!(from = ?self.state, to = ?next, "illegal engine state transition attempted");
        }
    }

    fn append_event(&self, event: &EngineEvent) {
        if let Err(e) = self.event_log.append_event(event) {
            error!(error = %e, "failed to append event to log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExchangeConfig, GridConfig, OperationalConfig};
    use crate::exchange::sim::{SimBar, SimulatedExchangeAdapter};
    use crate::types::Regime;

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
            degrade: Default::default(),
            operational: OperationalConfig::default(),
        }
    }

    #[tokio::test]
    async fn starts_and_ticks_against_the_simulated_adapter() {
        let adapter = Arc::new(SimulatedExchangeAdapter::new(100_000.0, 0.001));
        let event_log = EventLog::open_in_memory().unwrap();
        let mut engine = Engine::start(config(), adapter.clone(), event_log, 89_000.0, &[])
            .await
            .unwrap();
        assert_eq!(engine.state(), EngineState::Starting);

        let portfolio = PortfolioSnapshot {
            equity: 100_000.0,
            cash: 100_000.0,
            long_holdings: 0.0,
            short_holdings: 0.0,
            avg_cost: 0.0,
            unrealized_pnl: 0.0,
        };
        let now = DateTime::from_timestamp(0, 0).unwrap();
        let report = engine
            .tick(now, portfolio, std::time::Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(report.state, Some(EngineState::Running));

        adapter.advance_bar(SimBar {
            timestamp: now,
            open: 89_000.0,
            high: 89_100.0,
            low: 88_000.0,
            close: 88_500.0,
        });
        let portfolio_after_fill = PortfolioSnapshot {
            long_holdings: adapter.get_position().await.unwrap().long_qty,
            ..portfolio
        };
        let report2 = engine
            .tick(now, portfolio_after_fill, std::time::Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(report2.state, Some(EngineState::Running));

        engine.shutdown(now, "test_complete").await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn degrades_on_excessive_unrealized_loss() {
        let adapter = Arc::new(SimulatedExchangeAdapter::new(100_000.0, 0.001));
        let event_log = EventLog::open_in_memory().unwrap();
        let mut engine = Engine::start(config(), adapter, event_log, 89_000.0, &[])
            .await
            .unwrap();
        let now = DateTime::from_timestamp(0, 0).unwrap();
        engine
            .tick(
                now,
                PortfolioSnapshot {
                    equity: 100_000.0,
                    cash: 100_000.0,
                    long_holdings: 0.0,
                    short_holdings: 0.0,
                    avg_cost: 0.0,
                    unrealized_pnl: 0.0,
                },
                std::time::Duration::from_secs(0),
            )
            .await
            .unwrap();

        let report = engine
            .tick(
                now,
                PortfolioSnapshot {
                    equity: 100_000.0,
                    cash: 100_000.0,
                    long_holdings: 0.0,
                    short_holdings: 0.0,
                    avg_cost: 0.0,
                    unrealized_pnl: -20_000.0,
                },
                std::time::Duration::from_secs(0),
            )
            .await
            .unwrap();
        assert_eq!(report.state, Some(EngineState::Degraded));
    }
}
