//! Post-fill state transition (§4.D): a straight-line update to the
//! ledger and intended-order table on the engine, not a callback chain
//! across components. This is the single place a fill is allowed to
//! mutate grid state.

use tracing::{error, info};

use super::ledger::InventoryLedger;
use super::manager::GridManager;
use super::types::{Fill, IntendedOrder, Leg};
use crate::types::Side;

/// Result of applying one confirmed fill.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillOutcome {
    pub realized_pnl: f64,
}

/// Apply a confirmed fill to the ledger and intended-order table.
///
/// BUY fills open a lot and queue the paired SELL at the same level. SELL
/// fills consume lots FIFO, accumulate realized PnL, and re-enter with an
/// immediate BUY at the same level — re-entry happens on every SELL fill
/// chunk, including partial fills, not only on full lot consumption.
pub fn handle(
    fill: Fill,
    manager: &mut GridManager,
    ledger: &mut InventoryLedger,
    maker_fee: f64,
    now: chrono::DateTime<chrono::Utc>,
) -> FillOutcome {
    if fill.leg == Leg::ShortOpen && !manager.short_leg_enabled() {
        error!(level = fill.level_index, "fill for disabled short leg");
        return FillOutcome::default();
    }

    match fill.side {
        Side::Buy => {
            ledger.add_lot(fill.level_index, fill.size, fill.price, now);
            manager.remove(&(Side::Buy, fill.level_index, fill.leg));

            let target_sell = fill.level_index;
            if target_sell < manager.ladder.sell_levels.len() {
                let mut sell = IntendedOrder::new(
                    Side::Sell,
                    target_sell,
                    manager.ladder.sell_levels[target_sell],
                    fill.leg,
                );
                sell.quantity = Some(fill.size);
                manager.insert(sell);
                info!(level = target_sell, size = fill.size, "paired sell queued");
            }
            FillOutcome::default()
        }
        Side::Sell => {
            let mut remaining = fill.size;
            let mut realized_pnl = 0.0;
            while remaining > 1e-12 {
                let Some(chunk) = ledger.match_sell(fill.level_index, remaining) else {
                    break;
                };
                let fee = chunk.matched_size * fill.price * maker_fee;
                realized_pnl += (fill.price - chunk.matched_price) * chunk.matched_size - fee;
                remaining -= chunk.matched_size;
            }

            manager.remove(&(Side::Sell, fill.level_index, fill.leg));

            // Re-entry: immediate, not deferred to the next bar.
            if fill.level_index < manager.ladder.buy_levels.len() {
                let buy = IntendedOrder::new(
                    Side::Buy,
                    fill.level_index,
                    manager.ladder.buy_levels[fill.level_index],
                    fill.leg,
                );
                manager.insert(buy);
                info!(level = fill.level_index, "re-entry buy placed");
            }

            FillOutcome { realized_pnl }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use crate::types::Regime;

    fn config() -> GridConfig {
        GridConfig {
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
        }
    }

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn nominal_round_trip_scenario() {
        // Seed scenario 1.
        let mut manager = GridManager::setup(89_000.0, &config(), 0.001, 0.0);
        let mut ledger = InventoryLedger::new();
        let buy_price = manager.ladder.buy_levels[0];
        let sell_price = manager.ladder.sell_levels[0];

        let buy_fill = Fill {
            side: Side::Buy,
            level_index: 0,
            price: buy_price,
            size: 0.001,
            leg: Leg::Long,
        };
        handle(buy_fill, &mut manager, &mut ledger, 0.001, now());
        assert!((ledger.long_exposure() - 0.001).abs() < 1e-9);
        assert!(manager.get(&(Side::Sell, 0, Leg::Long)).is_some());

        let sell_fill = Fill {
            side: Side::Sell,
            level_index: 0,
            price: sell_price,
            size: 0.001,
            leg: Leg::Long,
        };
        let outcome = handle(sell_fill, &mut manager, &mut ledger, 0.001, now());

        assert!((ledger.long_exposure()).abs() < 1e-9);
        assert!(manager.get(&(Side::Buy, 0, Leg::Long)).is_some());

        let expected_pnl = 0.001 * buy_price * manager.ladder.spacing
            - 0.001 * buy_price * 0.001
            - 0.001 * sell_price * 0.001;
        assert!((outcome.realized_pnl - expected_pnl).abs() < 1e-6);
    }

    #[test]
    fn partial_sell_reenters_immediately() {
        let mut manager = GridManager::setup(89_000.0, &config(), 0.001, 0.0);
        let mut ledger = InventoryLedger::new();
        let buy_price = manager.ladder.buy_levels[0];
        let sell_price = manager.ladder.sell_levels[0];
        ledger.add_lot(0, 0.002, buy_price, now());

        let partial = Fill {
            side: Side::Sell,
            level_index: 0,
            price: sell_price,
            size: 0.001,
            leg: Leg::Long,
        };
        handle(partial, &mut manager, &mut ledger, 0.001, now());
        assert!(manager.get(&(Side::Buy, 0, Leg::Long)).is_some());
        assert!((ledger.long_exposure() - 0.001).abs() < 1e-9);
    }
}
