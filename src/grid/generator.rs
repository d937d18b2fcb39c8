//! Deterministic construction of the buy/sell price ladder. Pure function:
//! the same inputs always produce the same ladder, and the ladder is built
//! once at session start and never mutated afterward.

use crate::indicators::atr;

pub const S_MAX: f64 = 0.05;

/// Inputs to ladder construction.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorInputs {
    pub support: f64,
    pub resistance: f64,
    pub min_return: f64,
    pub maker_fee: f64,
    pub volatility: f64,
    pub volatility_k: f64,
    pub layers_buy: usize,
    pub layers_sell: usize,
    pub cushion_atr_multiplier: f64,
}

/// The generated ladder: equal-length buy and sell price vectors, plus the
/// spacing fraction used to derive them.
#[derive(Debug, Clone)]
pub struct Ladder {
    pub buy_levels: Vec<f64>,
    pub sell_levels: Vec<f64>,
    pub spacing: f64,
    pub effective_support: f64,
    pub effective_resistance: f64,
}

/// Spacing fraction `s = min(s_max, max(s_base, s_base*(1+k*v)))`, with
/// `s_base = min_return + 2*maker_fee`, clamped above a small positive floor.
pub fn spacing_fraction(min_return: f64, maker_fee: f64, volatility: f64, k: f64) -> f64 {
    const S_BASE_FLOOR: f64 = 1e-4;
    let s_base = (min_return + 2.0 * maker_fee).max(S_BASE_FLOOR);
    let widened = s_base * (1.0 + k * volatility);
    widened.max(s_base).min(S_MAX)
}

/// Average True Range over the trailing window, using the same Wilder
/// smoothing as the rest of this codebase's indicator utilities.
pub fn atr_over(high: &[f64], low: &[f64], close: &[f64], period: usize) -> f64 {
    atr(high, low, close, period)
        .last()
        .copied()
        .flatten()
        .unwrap_or(0.0)
}

/// Build the ladder around center price `m`. Buy levels step down by the
/// spacing fraction from `m`; sell levels are derived from buy levels, not
/// independently from `m`, so pairing (I2) always holds by construction.
pub fn build_ladder(center: f64, inputs: GeneratorInputs, atr_value: f64) -> Ladder {
    let spacing = spacing_fraction(
        inputs.min_return,
        inputs.maker_fee,
        inputs.volatility,
        inputs.volatility_k,
    );

    let cushion = inputs.cushion_atr_multiplier * atr_value;
    let effective_support = inputs.support + cushion;
    let effective_resistance = inputs.resistance - cushion;

    let mut buy_levels = Vec::with_capacity(inputs.layers_buy);
    let mut b = center / (1.0 + spacing);
    while buy_levels.len() < inputs.layers_buy && b >= effective_support {
        buy_levels.push(b);
        b /= 1.0 + spacing;
    }

    // Sell levels are derived, not independent, and must share buy's
    // cardinality so pairing has a slot at every index even when a
    // derived sell price would overshoot the resistance band.
    let sell_levels: Vec<f64> = buy_levels.iter().map(|&p| p * (1.0 + spacing)).collect();
    let _ = inputs.layers_sell; // cardinality is fixed by buy_levels per the pairing requirement

    Ladder {
        buy_levels,
        sell_levels,
        spacing,
        effective_support,
        effective_resistance,
    }
}

/// Resolve the ladder's center price. With `mid_shift` enabled the center
/// tracks current price, clamped into the effective band; otherwise it is
/// fixed at the midpoint of support/resistance.
pub fn resolve_center(
    current_price: f64,
    support: f64,
    resistance: f64,
    atr_value: f64,
    cushion_atr_multiplier: f64,
    mid_shift: bool,
) -> f64 {
    if mid_shift {
        let cushion = cushion_atr_multiplier * atr_value;
        current_price.clamp(support + cushion, resistance - cushion)
    } else {
        (support + resistance) / 2.0
    }
}
