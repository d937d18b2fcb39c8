//! Performance benchmarks for the grid engine core.
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use grid_engine::grid::generator::{build_ladder, GeneratorInputs};
use grid_engine::grid::ledger::InventoryLedger;

fn benchmark_ladder_construction(c: &mut Criterion) {
    let inputs = GeneratorInputs {
        support: 84_000.0,
        resistance: 94_000.0,
        min_return: 0.001,
        maker_fee: 0.001,
        volatility: 0.2,
        volatility_k: 0.5,
        layers_buy: 10,
        layers_sell: 10,
        cushion_atr_multiplier: 1.0,
    };

    c.bench_function("build_ladder", |b| {
        b.iter(|| black_box(build_ladder(89_000.0, inputs, 50.0)))
    });
}

fn benchmark_ledger_fifo_matching(c: &mut Criterion) {
    let now = chrono::Utc::now();
    c.bench_function("ledger_add_and_match_lots", |b| {
        b.iter(|| {
            let mut ledger = InventoryLedger::new();
            for level in 0..10 {
                ledger.add_lot(level, 1.0, 89_000.0 - level as f64 * 100.0, now);
            }
            black_box(ledger.match_sell(5, 1.0));
        })
    });
}

criterion_group!(benches, benchmark_ladder_construction, benchmark_ledger_fifo_matching);
criterion_main!(benches);
