//! CLI subcommands: `live` drives the engine against `HttpExchangeAdapter`,
//! `backtest` drives it against `SimulatedExchangeAdapter` over historical
//! candles. Both wire the same [`crate::engine::Engine`].

pub mod backtest;
pub mod live;
