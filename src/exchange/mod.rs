//! Exchange adapter trait contract and the two implementations: a real
//! HTTP-backed client and a simulated backtest driver sharing the same
//! grid code path.

pub mod auth;
pub mod http;
pub mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::types::{AccountSnapshot, PositionSnapshot, Side};

/// Terminal or in-flight status of an order as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

/// A live order as currently reported by `list_open_orders`.
#[derive(Debug, Clone)]
pub struct LiveOrder {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub filled_qty: f64,
    pub status: OrderStatus,
}

/// Result of querying a single order's terminal status.
#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub avg_fill_price: f64,
}

/// Bidirectional contract the grid engine drives every tick. Implemented
/// by `HttpExchangeAdapter` for live trading and `SimulatedExchangeAdapter`
/// for backtests; the engine loop and grid subsystems never branch on
/// which one they're talking to.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn place_limit_order(
        &self,
        side: Side,
        price: f64,
        qty: f64,
        client_order_id: &str,
    ) -> Result<String, ExchangeError>;

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError>;

    async fn query_order(&self, exchange_order_id: &str) -> Result<OrderQuery, ExchangeError>;

    async fn list_open_orders(&self) -> Result<Vec<LiveOrder>, ExchangeError>;

    async fn get_position(&self) -> Result<PositionSnapshot, ExchangeError>;

    async fn get_account(&self) -> Result<AccountSnapshot, ExchangeError>;

    /// Set exchange-side one-way position mode. Hedge mode is disallowed
    /// for the long-only configuration; this is a session-start one-shot.
    async fn ensure_one_way_mode(&self) -> Result<(), ExchangeError>;
}
