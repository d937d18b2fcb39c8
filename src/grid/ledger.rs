//! Per-level FIFO lot accounting. Independent of exchange-reported
//! holdings; the reconciler watches for drift between the two, but the
//! safety gate always treats exchange holdings as the source of truth.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use super::types::{Lot, MatchedChunk};

#[derive(Debug, Default)]
pub struct InventoryLedger {
    lots: HashMap<usize, VecDeque<Lot>>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self { lots: HashMap::new() }
    }

    pub fn add_lot(&mut self, level_index: usize, size: f64, price: f64, t: DateTime<Utc>) {
        self.lots.entry(level_index).or_default().push_back(Lot {
            buy_level_index: level_index,
            buy_price: price,
            size,
            opened_at: t,
        });
    }

    /// Consume up to `size` from the level's FIFO queue; falls back to the
    /// globally oldest lot across all levels if the requested level is
    /// empty. Returns `None` if there is no inventory left anywhere.
    pub fn match_sell(&mut self, level_index: usize, size: f64) -> Option<MatchedChunk> {
        if self.lots.get(&level_index).is_some_and(|q| !q.is_empty()) {
            return self.consume_from_level(level_index, size);
        }
        let oldest_level = self.oldest_lot_level()?;
        self.consume_from_level(oldest_level, size)
    }

    fn consume_from_level(&mut self, level_index: usize, size: f64) -> Option<MatchedChunk> {
        let queue = self.lots.get_mut(&level_index)?;
        let front = queue.front_mut()?;
        let matched_price = front.buy_price;
        let matched_size = front.size.min(size);
        front.size -= matched_size;
        if front.size <= 1e-12 {
            queue.pop_front();
        }
        Some(MatchedChunk {
            matched_level: level_index,
            matched_price,
            matched_size,
        })
    }

    fn oldest_lot_level(&self) -> Option<usize> {
        self.lots
            .iter()
            .filter_map(|(level, q)| q.front().map(|lot| (*level, lot.opened_at)))
            .min_by_key(|(_, opened_at)| *opened_at)
            .map(|(level, _)| level)
    }

    pub fn long_exposure(&self) -> f64 {
        self.lots
            .values()
            .flat_map(|q| q.iter())
            .map(|lot| lot.size)
            .sum()
    }

    pub fn cost_basis(&self) -> f64 {
        self.lots
            .values()
            .flat_map(|q| q.iter())
            .map(|lot| lot.size * lot.buy_price)
            .sum()
    }

    pub fn lots_at(&self, level_index: usize) -> impl Iterator<Item = &Lot> {
        self.lots.get(&level_index).into_iter().flat_map(|q| q.iter())
    }

    /// Snapshot of `(level, total_size)` pairs for open lots, used by the
    /// pairing-bijection check against pending SELL intended orders.
    pub fn open_lot_totals(&self) -> Vec<(usize, f64)> {
        self.lots
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(level, q)| (*level, q.iter().map(|lot| lot.size).sum()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn add_and_match_same_level() {
        let mut ledger = InventoryLedger::new();
        ledger.add_lot(0, 0.001, 88_734.4, t(1));
        let chunk = ledger.match_sell(0, 0.001).unwrap();
        assert_eq!(chunk.matched_level, 0);
        assert!((chunk.matched_price - 88_734.4).abs() < 1e-9);
        assert!((chunk.matched_size - 0.001).abs() < 1e-9);
        assert_eq!(ledger.long_exposure(), 0.0);
    }

    #[test]
    fn falls_back_to_globally_oldest_lot() {
        let mut ledger = InventoryLedger::new();
        ledger.add_lot(3, 0.002, 90_000.0, t(1));
        // level 7 has no lots; fall back to level 3's lot.
        let chunk = ledger.match_sell(7, 0.002).unwrap();
        assert_eq!(chunk.matched_level, 3);
        assert!((chunk.matched_size - 0.002).abs() < 1e-9);
    }

    #[test]
    fn partial_consumption_shrinks_lot() {
        let mut ledger = InventoryLedger::new();
        ledger.add_lot(0, 0.003, 50_000.0, t(1));
        let chunk = ledger.match_sell(0, 0.001).unwrap();
        assert!((chunk.matched_size - 0.001).abs() < 1e-9);
        assert!((ledger.long_exposure() - 0.002).abs() < 1e-9);
    }

    #[test]
    fn fifo_orders_within_a_level() {
        let mut ledger = InventoryLedger::new();
        ledger.add_lot(0, 0.001, 50_000.0, t(1));
        ledger.add_lot(0, 0.001, 51_000.0, t(2));
        let chunk = ledger.match_sell(0, 0.001).unwrap();
        assert!((chunk.matched_price - 50_000.0).abs() < 1e-9);
    }

    #[test]
    fn cost_basis_sums_price_times_size() {
        let mut ledger = InventoryLedger::new();
        ledger.add_lot(0, 1.0, 100.0, t(1));
        ledger.add_lot(1, 2.0, 50.0, t(2));
        assert!((ledger.cost_basis() - 200.0).abs() < 1e-9);
    }
}
