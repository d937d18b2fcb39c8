//! Pre-submit predicate guarding every order placement (§4.F). The last
//! line of defense when ledger or reconciler logic is in error: a SELL
//! whose size exceeds actual long inventory would open a short, which is
//! forbidden by the long-only invariant.

use tracing::{error, warn};

use crate::types::Side;

pub const EPS_SELL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    AllowWithWarning,
    Block,
}

/// Check a SELL of `qty` at `price` against exchange-reported long holdings.
pub fn check_sell(qty: f64, long_holdings: f64, eps_sell: f64) -> GateDecision {
    if long_holdings < qty * (1.0 - eps_sell) {
        error!(
            qty,
            long_holdings, "safety gate blocked SELL exceeding long holdings"
        );
        return GateDecision::Block;
    }
    if qty >= 0.9 * long_holdings {
        warn!(qty, long_holdings, "SELL will close most of the position");
        return GateDecision::AllowWithWarning;
    }
    GateDecision::Allow
}

/// Check a BUY of `qty` at `price` against the leverage cap.
pub fn check_buy(
    qty: f64,
    price: f64,
    long_holdings: f64,
    short_holdings: f64,
    equity: f64,
    leverage_max: f64,
    buffer: f64,
) -> GateDecision {
    let projected_notional = (long_holdings.abs() + short_holdings.abs() + qty) * price;
    let cap = equity * leverage_max * (1.0 - buffer);
    if projected_notional > cap {
        error!(
            projected_notional,
            cap, "safety gate blocked BUY exceeding leverage cap"
        );
        return GateDecision::Block;
    }
    GateDecision::Allow
}

/// Convenience entry point dispatching on side.
pub fn check(
    side: Side,
    qty: f64,
    price: f64,
    long_holdings: f64,
    short_holdings: f64,
    equity: f64,
    leverage_max: f64,
    buffer: f64,
    eps_sell: f64,
) -> GateDecision {
    match side {
        Side::Sell => check_sell(qty, long_holdings, eps_sell),
        Side::Buy => check_buy(qty, price, long_holdings, short_holdings, equity, leverage_max, buffer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_block_scenario() {
        // Seed scenario 4: ledger long=0.001, exchange long=0, pending sell qty=0.001.
        let decision = check_sell(0.001, 0.0, EPS_SELL);
        assert_eq!(decision, GateDecision::Block);
    }

    #[test]
    fn allows_sell_within_tolerance() {
        let decision = check_sell(0.001, 0.00098, EPS_SELL);
        assert_eq!(decision, GateDecision::Allow);
    }

    #[test]
    fn warns_when_closing_most_of_position() {
        let decision = check_sell(0.92, 1.0, EPS_SELL);
        assert_eq!(decision, GateDecision::AllowWithWarning);
    }

    #[test]
    fn blocks_buy_exceeding_leverage_cap() {
        let decision = check_buy(10.0, 90_000.0, 0.0, 0.0, 100_000.0, 1.0, 0.05);
        assert_eq!(decision, GateDecision::Block);
    }

    #[test]
    fn allows_buy_within_leverage_cap() {
        let decision = check_buy(0.001, 90_000.0, 0.0, 0.0, 100_000.0, 1.0, 0.05);
        assert_eq!(decision, GateDecision::Allow);
    }
}
