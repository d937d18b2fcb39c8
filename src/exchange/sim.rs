//! Simulated exchange adapter: fills against historical bar OHLC using the
//! exact same trigger rule `evaluate_bar` uses, so backtest and live share
//! one code path above this adapter. No divergent logic is permitted here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ExchangeError;
use crate::types::{AccountSnapshot, PositionSnapshot, Side};

use super::{ExchangeAdapter, LiveOrder, OrderQuery, OrderStatus};

#[derive(Debug, Clone, Copy)]
pub struct SimBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone)]
struct SimOrder {
    client_order_id: String,
    exchange_order_id: String,
    side: Side,
    price: f64,
    qty: f64,
    filled_qty: f64,
    status: OrderStatus,
}

/// A fill produced while advancing the simulation one bar.
#[derive(Debug, Clone, Copy)]
pub struct SimFill {
    pub client_order_id_hash: u64,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
}

struct SimState {
    orders: HashMap<String, SimOrder>,
    next_order_id: u64,
    position: PositionSnapshot,
    account: AccountSnapshot,
    maker_fee: f64,
    pending_fills: Vec<(String, SimFill)>,
}

pub struct SimulatedExchangeAdapter {
    state: Mutex<SimState>,
}

impl SimulatedExchangeAdapter {
    pub fn new(initial_cash: f64, maker_fee: f64) -> Self {
        Self {
            state: Mutex::new(SimState {
                orders: HashMap::new(),
                next_order_id: 1,
                position: PositionSnapshot::default(),
                account: AccountSnapshot {
                    equity: initial_cash,
                    cash: initial_cash,
                    unrealized_pnl: 0.0,
                },
                maker_fee,
                pending_fills: Vec::new(),
            }),
        }
    }

    /// Advance the simulated book by one bar, filling any open order whose
    /// price lies within `[bar.low, bar.high]`. BUY fills execute at
    /// `min(limit, bar.open)`, SELL fills at `max(limit, bar.open)`.
    pub fn advance_bar(&self, bar: SimBar) {
        let mut state = self.state.lock().unwrap();
        let maker_fee = state.maker_fee;
        let mut filled_client_ids = Vec::new();

        for order in state.orders.values_mut() {
            if order.status != OrderStatus::Open && order.status != OrderStatus::Partial {
                continue;
            }
            let triggered = bar.low <= order.price && order.price <= bar.high;
            if !triggered {
                continue;
            }
            let exec_price = match order.side {
                Side::Buy => order.price.min(bar.open),
                Side::Sell => order.price.max(bar.open),
            };
            let qty = order.qty - order.filled_qty;
            order.filled_qty = order.qty;
            order.status = OrderStatus::Filled;

            filled_client_ids.push((
                order.client_order_id.clone(),
                SimFill {
                    client_order_id_hash: 0,
                    side: order.side,
                    price: exec_price,
                    qty,
                },
            ));
        }

        for (_, fill) in &filled_client_ids {
            let fee = fill.qty * fill.price * maker_fee;
            match fill.side {
                Side::Buy => {
                    let new_qty = state.position.long_qty + fill.qty;
                    let new_cost = state.position.avg_entry_price * state.position.long_qty
                        + fill.price * fill.qty;
                    state.position.avg_entry_price = if new_qty > 0.0 {
                        new_cost / new_qty
                    } else {
                        0.0
                    };
                    state.position.long_qty = new_qty;
                    state.account.cash -= fill.qty * fill.price + fee;
                }
                Side::Sell => {
                    let realized = (fill.price - state.position.avg_entry_price) * fill.qty - fee;
                    state.position.long_qty = (state.position.long_qty - fill.qty).max(0.0);
                    state.account.cash += fill.qty * fill.price - fee;
                    state.account.equity += realized;
                }
            }
        }

        state.pending_fills.extend(filled_client_ids);
        let _ = bar.close;
        let _ = bar.timestamp;
    }

    /// Drain fills produced by the most recent `advance_bar` calls.
    pub fn drain_fills(&self) -> Vec<(String, SimFill)> {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.pending_fills)
    }
}

#[async_trait]
impl ExchangeAdapter for SimulatedExchangeAdapter {
    async fn place_limit_order(
        &self,
        side: Side,
        price: f64,
        qty: f64,
        client_order_id: &str,
    ) -> Result<String, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        if state.orders.contains_key(client_order_id) {
            return Err(ExchangeError::DuplicateClientOrderId);
        }
        let exchange_order_id = format!("sim-{}", state.next_order_id);
        state.next_order_id += 1;
        state.orders.insert(
            client_order_id.to_string(),
            SimOrder {
                client_order_id: client_order_id.to_string(),
                exchange_order_id: exchange_order_id.clone(),
                side,
                price,
                qty,
                filled_qty: 0.0,
                status: OrderStatus::Open,
            },
        );
        Ok(exchange_order_id)
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();
        let key = state
            .orders
            .iter()
            .find(|(_, o)| o.exchange_order_id == exchange_order_id)
            .map(|(k, _)| k.clone());
        match key {
            Some(k) => {
                state.orders.remove(&k);
                Ok(())
            }
            None => Err(ExchangeError::NotFound),
        }
    }

    async fn query_order(&self, exchange_order_id: &str) -> Result<OrderQuery, ExchangeError> {
        let state = self.state.lock().unwrap();
        state
            .orders
            .values()
            .find(|o| o.exchange_order_id == exchange_order_id)
            .map(|o| OrderQuery {
                status: o.status,
                filled_qty: o.filled_qty,
                avg_fill_price: o.price,
            })
            .ok_or(ExchangeError::NotFound)
    }

    async fn list_open_orders(&self) -> Result<Vec<LiveOrder>, ExchangeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .values()
            .filter(|o| matches!(o.status, OrderStatus::Open | OrderStatus::Partial))
            .map(|o| LiveOrder {
                client_order_id: o.client_order_id.clone(),
                exchange_order_id: o.exchange_order_id.clone(),
                side: o.side,
                price: o.price,
                qty: o.qty,
                filled_qty: o.filled_qty,
                status: o.status,
            })
            .collect())
    }

    async fn get_position(&self) -> Result<PositionSnapshot, ExchangeError> {
        Ok(self.state.lock().unwrap().position)
    }

    async fn get_account(&self) -> Result<AccountSnapshot, ExchangeError> {
        Ok(self.state.lock().unwrap().account)
    }

    async fn ensure_one_way_mode(&self) -> Result<(), ExchangeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> SimBar {
        SimBar {
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            open,
            high,
            low,
            close,
        }
    }

    #[tokio::test]
    async fn fills_buy_order_when_price_drops_to_limit() {
        let sim = SimulatedExchangeAdapter::new(100_000.0, 0.001);
        sim.place_limit_order(Side::Buy, 88_734.4, 0.001, "coid-1")
            .await
            .unwrap();
        sim.advance_bar(bar(89_000.0, 89_000.0, 88_734.4, 88_800.0));

        let fills = sim.drain_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].1.side, Side::Buy);

        let position = sim.get_position().await.unwrap();
        assert!((position.long_qty - 0.001).abs() < 1e-9);
    }

    #[tokio::test]
    async fn duplicate_client_order_id_is_rejected() {
        let sim = SimulatedExchangeAdapter::new(100_000.0, 0.001);
        sim.place_limit_order(Side::Buy, 50_000.0, 0.001, "coid-1")
            .await
            .unwrap();
        let result = sim
            .place_limit_order(Side::Buy, 50_000.0, 0.001, "coid-1")
            .await;
        assert!(matches!(result, Err(ExchangeError::DuplicateClientOrderId)));
    }
}
