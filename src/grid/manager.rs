//! Intended-order table and grid bookkeeping. Owns the table keyed by
//! `(side, level_index, leg)`, the immutable ladder for the session, and
//! quantity planning. Fill application itself lives in `fill_handler` so
//! the state transition stays a straight line rather than a callback
//! chain back into this module.

use std::collections::HashMap;

use crate::config::GridConfig;
use crate::types::{Regime, Side};

use super::generator::{self, GeneratorInputs, Ladder};
use super::types::{IntendedKey, IntendedOrder, Leg, OrderState};

/// A bar, as seen by the trigger evaluator in backtest mode.
#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One triggered intended order for a bar, with its execution price.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub key: IntendedKey,
    pub side: Side,
    pub level_index: usize,
    pub leg: Leg,
    pub limit_price: f64,
    pub exec_price: f64,
    pub quantity: f64,
}

pub struct GridManager {
    pub ladder: Ladder,
    intended: HashMap<IntendedKey, IntendedOrder>,
    active_buy_levels: usize,
    risk_budget_pct: f64,
    leverage: f64,
    regime: Regime,
    enable_short_in_bearish: bool,
    throttle: f64,
}

impl GridManager {
    /// Build the immutable ladder and populate the initial BUY ladder,
    /// capped to the `active_buy_levels` nearest the center price. SELLs
    /// start empty; they are created only by fills.
    pub fn setup(center: f64, config: &GridConfig, maker_fee: f64, atr_value: f64) -> Self {
        let inputs = GeneratorInputs {
            support: config.support,
            resistance: config.resistance,
            min_return: config.min_return,
            maker_fee,
            volatility: 0.0,
            volatility_k: config.volatility_k,
            layers_buy: config.grid_layers_buy,
            layers_sell: config.grid_layers_sell,
            cushion_atr_multiplier: config.cushion_multiplier,
        };
        let ladder = generator::build_ladder(center, inputs, atr_value);

        let mut intended = HashMap::new();
        let cap = config.active_buy_levels.min(ladder.buy_levels.len());
        for i in 0..cap {
            let order = IntendedOrder::new(Side::Buy, i, ladder.buy_levels[i], Leg::Long);
            intended.insert(order.key(), order);
        }

        Self {
            ladder,
            intended,
            active_buy_levels: config.active_buy_levels,
            risk_budget_pct: config.risk_budget_pct,
            leverage: config.leverage,
            regime: config.regime,
            enable_short_in_bearish: config.enable_short_in_bearish,
            throttle: 1.0,
        }
    }

    /// Bounded factor in `[0, 1]` applied to every planned quantity.
    /// Blocking signals set this to zero for the current bar.
    pub fn set_throttle(&mut self, throttle: f64) {
        self.throttle = throttle.clamp(0.0, 1.0);
    }

    pub fn active_buy_levels(&self) -> usize {
        self.active_buy_levels
    }

    pub fn short_leg_enabled(&self) -> bool {
        self.enable_short_in_bearish && self.regime == Regime::BearishRange
    }

    pub fn get(&self, key: &IntendedKey) -> Option<&IntendedOrder> {
        self.intended.get(key)
    }

    pub fn get_mut(&mut self, key: &IntendedKey) -> Option<&mut IntendedOrder> {
        self.intended.get_mut(key)
    }

    pub fn insert(&mut self, order: IntendedOrder) {
        self.intended.insert(order.key(), order);
    }

    pub fn remove(&mut self, key: &IntendedKey) -> Option<IntendedOrder> {
        self.intended.remove(key)
    }

    pub fn planned_orders(&self) -> Vec<&IntendedOrder> {
        self.intended.values().collect()
    }

    pub fn planned_orders_mut(&mut self) -> impl Iterator<Item = &mut IntendedOrder> {
        self.intended.values_mut()
    }

    /// Size an order from the risk budget, a per-level weight, leverage,
    /// and the current throttle multiplier. Zero means "blocked".
    pub fn plan_order_quantity(&self, price: f64, equity: f64, level_weight: f64) -> f64 {
        if price <= 0.0 || equity <= 0.0 {
            return 0.0;
        }
        let notional = equity * self.risk_budget_pct * self.leverage * level_weight * self.throttle;
        (notional / price).max(0.0)
    }

    /// Detect triggered orders for a backtest bar: a limit is triggered if
    /// it falls within `[bar.low, bar.high]`. Execution price for a BUY is
    /// `min(limit, bar.open)`, for a SELL `max(limit, bar.open)`.
    pub fn evaluate_bar(&self, bar: Bar, equity: f64) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        for order in self.intended.values() {
            if order.state == OrderState::Cancelling {
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
            let quantity = order
                .quantity
                .unwrap_or_else(|| self.plan_order_quantity(order.price, equity, self.level_weight(order.level_index)));
            triggers.push(Trigger {
                key: order.key(),
                side: order.side,
                level_index: order.level_index,
                leg: order.leg,
                limit_price: order.price,
                exec_price,
                quantity,
            });
        }
        // Within a bar a triggered BUY is processed before a triggered SELL.
        triggers.sort_by_key(|t| match t.side {
            Side::Buy => 0,
            Side::Sell => 1,
        });
        triggers
    }

    /// Levels nearer the center get proportionally more weight; a simple
    /// linear taper keeps far-out levels from dominating the risk budget.
    fn level_weight(&self, level_index: usize) -> f64 {
        let n = self.ladder.buy_levels.len().max(1) as f64;
        1.0 - (level_index as f64 / n) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Regime;

    fn config() -> GridConfig {
        GridConfig {
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
            cushion_multiplier: 0.0,
            atr_period: 14,
        }
    }

    #[test]
    fn setup_populates_capped_initial_buys() {
        let manager = GridManager::setup(89_000.0, &config(), 0.001, 0.0);
        assert_eq!(manager.planned_orders().len(), 10);
        for order in manager.planned_orders() {
            assert_eq!(order.side, Side::Buy);
            assert_eq!(order.leg, Leg::Long);
        }
    }

    #[test]
    fn evaluate_bar_orders_buys_before_sells() {
        let mut manager = GridManager::setup(89_000.0, &config(), 0.001, 0.0);
        let sell_price = manager.ladder.sell_levels[0];
        manager.insert(IntendedOrder::new(Side::Sell, 0, sell_price, Leg::Long));
        let bar = Bar {
            open: 89_000.0,
            high: sell_price + 1.0,
            low: manager.ladder.buy_levels[0] - 1.0,
            close: 89_000.0,
        };
        let triggers = manager.evaluate_bar(bar, 100_000.0);
        assert!(triggers.len() >= 2);
        assert_eq!(triggers[0].side, Side::Buy);
    }

    #[test]
    fn short_leg_gated_on_bearish_regime() {
        let mut cfg = config();
        cfg.enable_short_in_bearish = true;
        cfg.regime = Regime::NeutralRange;
        let manager = GridManager::setup(89_000.0, &cfg, 0.001, 0.0);
        assert!(!manager.short_leg_enabled());
    }
}
