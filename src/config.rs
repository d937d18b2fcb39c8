//! Configuration loading.
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for exchange API credentials, same convention this
//! codebase has always used for its config surface.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::Regime;

/// Top-level engine configuration, read once at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub grid: GridConfig,
    #[serde(default)]
    pub degrade: DegradeConfig,
    #[serde(default)]
    pub operational: OperationalConfig,
}

impl Config {
    /// Load configuration from a JSON file, overlaying exchange credentials
    /// from the environment if present.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(api_key) = std::env::var("EXCHANGE_API_KEY") {
            config.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("EXCHANGE_API_SECRET") {
            config.exchange.api_secret = Some(api_secret);
        }

        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Cross-field validation that can't be expressed with serde alone.
    pub fn validate(&self) -> Result<(), String> {
        if self.grid.support >= self.grid.resistance {
            return Err("grid.support must be < grid.resistance".to_string());
        }
        if self.grid.grid_layers_buy == 0 {
            return Err("grid.grid_layers_buy must be > 0".to_string());
        }
        if self.grid.min_return <= 0.0 {
            return Err("grid.min_return must be > 0".to_string());
        }
        if self.grid.enable_short_in_bearish && self.grid.regime != Regime::BearishRange {
            return Err("grid.enable_short_in_bearish requires regime=bearish_range".to_string());
        }
        Ok(())
    }
}

/// Exchange connection and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    pub symbol: String,
    #[serde(default = "default_maker_fee")]
    pub maker_fee: f64,
    #[serde(default = "default_taker_fee")]
    pub taker_fee: f64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_sec: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_maker_fee() -> f64 {
    0.001
}
fn default_taker_fee() -> f64 {
    0.001
}
fn default_rate_limit() -> usize {
    10
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            symbol: "BTCINR".to_string(),
            maker_fee: default_maker_fee(),
            taker_fee: default_taker_fee(),
            rate_limit_per_sec: default_rate_limit(),
            max_retries: default_max_retries(),
        }
    }
}

/// Grid ladder construction and sizing configuration — the configuration
/// surface enumerated for the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub support: f64,
    pub resistance: f64,
    #[serde(default = "default_regime")]
    pub regime: Regime,
    #[serde(default = "default_layers")]
    pub grid_layers_buy: usize,
    #[serde(default = "default_layers")]
    pub grid_layers_sell: usize,
    pub min_return: f64,
    #[serde(default = "default_volatility_k")]
    pub volatility_k: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_risk_budget_pct")]
    pub risk_budget_pct: f64,
    pub initial_cash: f64,
    #[serde(default = "default_active_buy_levels")]
    pub active_buy_levels: usize,
    #[serde(default)]
    pub enable_mid_shift: bool,
    #[serde(default)]
    pub enable_short_in_bearish: bool,
    #[serde(default = "default_cushion_multiplier")]
    pub cushion_multiplier: f64,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
}

fn default_regime() -> Regime {
    Regime::NeutralRange
}
fn default_layers() -> usize {
    10
}
fn default_volatility_k() -> f64 {
    0.5
}
fn default_leverage() -> f64 {
    1.0
}
fn default_risk_budget_pct() -> f64 {
    0.02
}
fn default_active_buy_levels() -> usize {
    10
}
fn default_cushion_multiplier() -> f64 {
    1.0
}
fn default_atr_period() -> usize {
    14
}

/// Thresholds that trigger the engine's `DEGRADED` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradeConfig {
    #[serde(default = "default_max_unrealized_loss_pct")]
    pub max_unrealized_loss_pct: f64,
    #[serde(default = "default_max_inventory_ratio")]
    pub max_inventory_ratio: f64,
    #[serde(default = "default_consecutive_failure_limit")]
    pub consecutive_failure_limit: u32,
    #[serde(default = "default_data_staleness_secs")]
    pub data_staleness_secs: u64,
}

fn default_max_unrealized_loss_pct() -> f64 {
    0.15
}
fn default_max_inventory_ratio() -> f64 {
    1.5
}
fn default_consecutive_failure_limit() -> u32 {
    5
}
fn default_data_staleness_secs() -> u64 {
    5
}

impl Default for DegradeConfig {
    fn default() -> Self {
        Self {
            max_unrealized_loss_pct: default_max_unrealized_loss_pct(),
            max_inventory_ratio: default_max_inventory_ratio(),
            consecutive_failure_limit: default_consecutive_failure_limit(),
            data_staleness_secs: default_data_staleness_secs(),
        }
    }
}

/// Safety-gate tolerances and loop timing, all fixed by the core but kept
/// configurable for operator tuning without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalConfig {
    #[serde(default = "default_eps_sell")]
    pub eps_sell: f64,
    #[serde(default = "default_eps_fill")]
    pub eps_fill: f64,
    #[serde(default = "default_tick_budget_secs")]
    pub tick_budget_secs: u64,
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_bar_interval_secs")]
    pub bar_interval_secs: u64,
}

fn default_eps_sell() -> f64 {
    0.05
}
fn default_eps_fill() -> f64 {
    0.05
}
fn default_tick_budget_secs() -> u64 {
    10
}
fn default_submit_timeout_secs() -> u64 {
    5
}
fn default_query_timeout_secs() -> u64 {
    3
}
fn default_bar_interval_secs() -> u64 {
    60
}

impl Default for OperationalConfig {
    fn default() -> Self {
        Self {
            eps_sell: default_eps_sell(),
            eps_fill: default_eps_fill(),
            tick_budget_secs: default_tick_budget_secs(),
            submit_timeout_secs: default_submit_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            bar_interval_secs: default_bar_interval_secs(),
        }
    }
}

impl OperationalConfig {
    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs(self.tick_budget_secs)
    }
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            exchange: ExchangeConfig::default(),
            grid: GridConfig {
                support: 84_000.0,
                resistance: 94_000.0,
                regime: Regime::NeutralRange,
                grid_layers_buy: 10,
                grid_layers_sell: 10,
                min_return: 0.001,
                volatility_k: 0.5,
                leverage: 1.0,
                risk_budget_pct: 0.02,
                initial_cash: 100_000.0,
                active_buy_levels: 10,
                enable_mid_shift: false,
                enable_short_in_bearish: false,
                cushion_multiplier: 1.0,
                atr_period: 14,
            },
            degrade: DegradeConfig::default(),
            operational: OperationalConfig::default(),
        }
    }

    #[test]
    fn validates_support_below_resistance() {
        let mut cfg = sample_config();
        cfg.grid.support = 95_000.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_short_leg_without_bearish_regime() {
        let mut cfg = sample_config();
        cfg.grid.enable_short_in_bearish = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        assert!(sample_config().validate().is_ok());
    }
}
