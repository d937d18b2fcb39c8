//! Data types shared across the grid submodules: levels, intended orders,
//! lots, and the leg tag that distinguishes the long grid from the
//! (disabled-by-default) short overlay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Side;

/// Origin of an order: the long grid, or the guarded short overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    Long,
    ShortOpen,
}

/// Lifecycle state of an intended order as tracked by the grid manager,
/// independent of the exchange's own order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Planned,
    Submitted,
    Acknowledged,
    Cancelling,
}

/// Uniqueness key for an intended order: one order may exist per
/// `(side, level_index, leg)` at any observation point.
pub type IntendedKey = (Side, usize, Leg);

/// The engine's desire for an order to exist on the exchange. Quantity may
/// be computed lazily at submission time, so it stays optional until the
/// reconciler actually prices and sizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntendedOrder {
    pub side: Side,
    pub level_index: usize,
    pub price: f64,
    pub quantity: Option<f64>,
    pub leg: Leg,
    pub state: OrderState,
    pub client_order_id: Option<String>,
    pub exchange_order_id: Option<String>,
}

impl IntendedOrder {
    pub fn new(side: Side, level_index: usize, price: f64, leg: Leg) -> Self {
        Self {
            side,
            level_index,
            price,
            quantity: None,
            leg,
            state: OrderState::Planned,
            client_order_id: None,
            exchange_order_id: None,
        }
    }

    pub fn key(&self) -> IntendedKey {
        (self.side, self.level_index, self.leg)
    }
}

/// A BUY fill's unconsumed quantity at a specific level. Lots are grouped
/// per level and consumed FIFO by `opened_at`; a SELL fill shrinks or
/// removes a lot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lot {
    pub buy_level_index: usize,
    pub buy_price: f64,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
}

/// Outcome of matching a SELL against the ledger: which level the matched
/// lot came from (not necessarily the requested level, per the same-level-
/// first-then-oldest-lot fallback policy), its entry price, and how much
/// of the requested size it satisfied.
#[derive(Debug, Clone, Copy)]
pub struct MatchedChunk {
    pub matched_level: usize,
    pub matched_price: f64,
    pub matched_size: f64,
}

/// A confirmed fill handed to the fill handler.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub side: Side,
    pub level_index: usize,
    pub price: f64,
    pub size: f64,
    pub leg: Leg,
}
