//! Core data types shared across the engine, exchange adapters, and persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick / bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Trading pair symbol, e.g. "BTCINR".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Market regime bias read from configuration; affects buy/sell weighting and
/// whether the guarded short leg may be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    NeutralRange,
    BullishRange,
    BearishRange,
}

/// Exchange-reported account snapshot, refreshed once per tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub cash: f64,
    pub unrealized_pnl: f64,
}

/// Exchange-reported position snapshot for the traded symbol.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub long_qty: f64,
    pub short_qty: f64,
    pub avg_entry_price: f64,
}

/// Full portfolio snapshot as seen by the engine loop for one tick, combining
/// the exchange account and position views.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub equity: f64,
    pub cash: f64,
    pub long_holdings: f64,
    pub short_holdings: f64,
    pub avg_cost: f64,
    pub unrealized_pnl: f64,
}

impl PortfolioSnapshot {
    pub fn from_parts(account: AccountSnapshot, position: PositionSnapshot) -> Self {
        Self {
            equity: account.equity,
            cash: account.cash,
            long_holdings: position.long_qty,
            short_holdings: position.short_qty,
            avg_cost: position.avg_entry_price,
            unrealized_pnl: account.unrealized_pnl,
        }
    }
}
