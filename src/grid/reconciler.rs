//! Convergence of the intended-order table to the exchange's actual open
//! orders (§4.E), including fill detection under uncertainty when an
//! order disappears and its status is unknown.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::events::{EngineEvent, EventKind, EventTrigger};
use crate::exchange::{ExchangeAdapter, OrderStatus};
use crate::types::Side;

use super::fill_handler;
use super::ledger::InventoryLedger;
use super::manager::GridManager;
use super::safety_gate::{self, GateDecision};
use super::types::{Fill, Leg};

/// Outcome of querying a disappeared order's terminal status.
#[derive(Debug, Clone, Copy)]
pub enum OrderQueryOutcome {
    Filled(FillInfo),
    Cancelled,
    Rejected,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct FillInfo {
    pub filled_qty: f64,
    pub avg_price: f64,
}

pub const EPS_FILL: f64 = 0.05;

pub struct ReconcileReport {
    pub events: Vec<EngineEvent>,
    pub realized_pnl: f64,
}

pub struct Reconciler {
    session_id: Uuid,
    session_salt: String,
}

impl Reconciler {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            session_salt: session_id.simple().to_string()[..8].to_string(),
        }
    }

    /// Deterministic client order id encoding `(side, level_index, leg)`
    /// plus a session-unique salt, stable across restarts within a session.
    pub fn client_order_id(&self, side: Side, level_index: usize, leg: Leg) -> String {
        let side_tag = match side {
            Side::Buy => "B",
            Side::Sell => "S",
        };
        let leg_tag = match leg {
            Leg::Long => "L",
            Leg::ShortOpen => "S",
        };
        format!("{}-{}-{}-{}", self.session_salt, side_tag, level_index, leg_tag)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn reconcile(
        &self,
        manager: &mut GridManager,
        ledger: &mut InventoryLedger,
        adapter: &dyn ExchangeAdapter,
        equity: f64,
        long_holdings: f64,
        short_holdings: f64,
        leverage_max: f64,
        buffer: f64,
        eps_sell: f64,
        eps_fill: f64,
        maker_fee: f64,
        now: DateTime<Utc>,
        placing_enabled: bool,
    ) -> ReconcileReport {
        let mut events = Vec::new();
        let mut realized_pnl = 0.0;

        let live_orders = match adapter.list_open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "failed to list open orders, skipping this reconcile pass");
                return ReconcileReport { events, realized_pnl };
            }
        };
        let live_ids: HashSet<String> = live_orders.iter().map(|o| o.client_order_id.clone()).collect();

        // Step 4: recover orders that were submitted but disappeared from live.
        let disappeared: Vec<_> = manager
            .planned_orders()
            .into_iter()
            .filter(|o| o.exchange_order_id.is_some() && !live_ids.contains(&self.client_order_id(o.side, o.level_index, o.leg)))
            .map(|o| (o.key(), o.side, o.level_index, o.price, o.leg, o.quantity.unwrap_or(0.0), o.exchange_order_id.clone().unwrap()))
            .collect();

        for (key, side, level_index, price, leg, qty, exchange_order_id) in disappeared {
            let outcome = self.query_outcome(adapter, &exchange_order_id).await;
            match outcome {
                OrderQueryOutcome::Filled(info) => {
                    let fill = Fill {
                        side,
                        level_index,
                        price: if info.avg_price > 0.0 { info.avg_price } else { price },
                        size: if info.filled_qty > 0.0 { info.filled_qty } else { qty },
                        leg,
                    };
                    let outcome = fill_handler::handle(fill, manager, ledger, maker_fee, now);
                    realized_pnl += outcome.realized_pnl;
                    events.push(EngineEvent::new(
                        self.session_id,
                        now,
                        EventKind::RecoveredFill,
                        EventTrigger::Sync,
                        format!("recovered fill at level {level_index}"),
                    ));
                }
                OrderQueryOutcome::Cancelled | OrderQueryOutcome::Rejected => {
                    manager.remove(&key);
                }
                OrderQueryOutcome::Unknown => {
                    let confirmed = match side {
                        Side::Buy => long_holdings >= ledger.long_exposure() + qty * (1.0 - eps_fill),
                        Side::Sell => long_holdings <= ledger.long_exposure() - qty * (1.0 - eps_fill),
                    };
                    if confirmed {
                        let fill = Fill { side, level_index, price, size: qty, leg };
                        let outcome = fill_handler::handle(fill, manager, ledger, maker_fee, now);
                        realized_pnl += outcome.realized_pnl;
                        events.push(EngineEvent::new(
                            self.session_id,
                            now,
                            EventKind::RecoveredFill,
                            EventTrigger::Sync,
                            format!("position-delta confirmed fill at level {level_index}"),
                        ));
                    } else {
                        manager.remove(&key);
                        events.push(EngineEvent::new(
                            self.session_id,
                            now,
                            EventKind::RecoveredDiscard,
                            EventTrigger::Sync,
                            "status_unknown_position_unchanged".to_string(),
                        ));
                    }
                }
            }
        }

        // Step 3: cancel live orders no longer intended.
        let intended_ids: HashSet<String> = manager
            .planned_orders()
            .into_iter()
            .map(|o| self.client_order_id(o.side, o.level_index, o.leg))
            .collect();
        for live in &live_orders {
            if !intended_ids.contains(&live.client_order_id) {
                if let Err(e) = adapter.cancel_order(&live.exchange_order_id).await {
                    warn!(error = %e, order = %live.exchange_order_id, "cancel request failed");
                }
            }
        }

        // Step 2: place intended orders not currently live. Skipped while degraded;
        // fill recovery and stale-order cancellation above still run.
        let to_place: Vec<_> = if placing_enabled {
            manager
                .planned_orders()
                .into_iter()
                .filter(|o| !live_ids.contains(&self.client_order_id(o.side, o.level_index, o.leg)))
                .map(|o| o.key())
                .collect()
        } else {
            Vec::new()
        };

        for key in to_place {
            let (side, level_index, leg) = key;
            let price = manager.get(&key).map(|o| o.price).unwrap_or(0.0);
            let qty = manager
                .get(&key)
                .and_then(|o| o.quantity)
                .unwrap_or_else(|| manager.plan_order_quantity(price, equity, 1.0));
            if qty <= 0.0 {
                continue;
            }

            let decision = safety_gate::check(
                side,
                qty,
                price,
                long_holdings,
                short_holdings,
                equity,
                leverage_max,
                buffer,
            eps_sell,
            );
            if decision == GateDecision::Block {
                manager.remove(&key);
                events.push(EngineEvent::new(
                    self.session_id,
                    now,
                    EventKind::SafetyBlock,
                    EventTrigger::Strategy,
                    format!("blocked {:?} at level {}", side, level_index),
                ));
                error!(?side, level_index, "safety gate blocked order submission");
                continue;
            }

            let coid = self.client_order_id(side, level_index, leg);
            match adapter.place_limit_order(side, price, qty, &coid).await {
                Ok(exchange_order_id) => {
                    if let Some(order) = manager.get_mut(&key) {
                        order.exchange_order_id = Some(exchange_order_id);
                        order.client_order_id = Some(coid);
                        order.quantity = Some(qty);
                    }
                    events.push(EngineEvent::new(
                        self.session_id,
                        now,
                        EventKind::Submitted,
                        EventTrigger::Strategy,
                        format!("placed {:?} at level {}", side, level_index),
                    ));
                }
                Err(ExchangeError::DuplicateClientOrderId) => {
                    info!(coid = %coid, "duplicate client order id, adopting existing order");
                }
                Err(ExchangeError::InsufficientBalance) | Err(ExchangeError::PrecisionViolation) => {
                    manager.remove(&key);
                    events.push(EngineEvent::new(
                        self.session_id,
                        now,
                        EventKind::Rejected,
                        EventTrigger::Exchange,
                        format!("rejected {:?} at level {}", side, level_index),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "order placement deferred to next tick");
                }
            }
        }

        // Step 5: drift detection, advisory only.
        let ledger_exposure = ledger.long_exposure();
        let drift = (ledger_exposure - long_holdings).abs();
        if drift > (eps_fill * long_holdings.abs()).max(1e-8) {
            events.push(EngineEvent::new(
                self.session_id,
                now,
                EventKind::Drift,
                EventTrigger::Sync,
                format!("ledger={ledger_exposure} exchange={long_holdings}"),
            ));
        }

        ReconcileReport { events, realized_pnl }
    }

    async fn query_outcome(&self, adapter: &dyn ExchangeAdapter, exchange_order_id: &str) -> OrderQueryOutcome {
        match adapter.query_order(exchange_order_id).await {
            Ok(q) => match q.status {
                OrderStatus::Filled | OrderStatus::Partial if q.filled_qty > 0.0 => {
                    OrderQueryOutcome::Filled(FillInfo {
                        filled_qty: q.filled_qty,
                        avg_price: q.avg_fill_price,
                    })
                }
                OrderStatus::Cancelled => OrderQueryOutcome::Cancelled,
                OrderStatus::Rejected => OrderQueryOutcome::Rejected,
                _ => OrderQueryOutcome::Unknown,
            },
            Err(_) => OrderQueryOutcome::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_id_is_stable_for_same_key() {
        let session_id = Uuid::nil();
        let r = Reconciler::new(session_id);
        let a = r.client_order_id(Side::Buy, 5, Leg::Long);
        let b = r.client_order_id(Side::Buy, 5, Leg::Long);
        assert_eq!(a, b);
        let c = r.client_order_id(Side::Sell, 5, Leg::Long);
        assert_ne!(a, c);
    }
}
