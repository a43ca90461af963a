//! Benchmark suite for fee computation and replay strategies
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! # Benchmark Fixtures
//!
//! - `replay_small.csv` - 15 orders, 105 rows
//! - `replay_medium.csv` - 150 orders, 1,050 rows
//!
//! Each order is opened, paid over mobile money, card and cash, discounted,
//! and settled with a confirmed manual payment.

use checkout_engine::cli::ReplayMode;
use checkout_engine::config::EngineConfig;
use checkout_engine::core::FeeCalculator;
use checkout_engine::strategy::{create_strategy, ReplaySettings};
use checkout_engine::types::{Amount, Operator, Rail};
use std::path::Path;

fn main() {
    divan::main();
}

#[divan::bench(args = [10_000, 45_000, 250_000])]
fn fee_mobile_money(bencher: divan::Bencher, amount: i64) {
    let fees = FeeCalculator::from_config(&EngineConfig::default()).expect("valid catalog");
    bencher.bench_local(|| {
        fees.compute_fee(
            divan::black_box(Rail::MobileMoney(Operator::Mtn)),
            divan::black_box(Amount::new(amount)),
        )
    });
}

fn replay(mode: ReplayMode, fixture: &str) {
    let strategy = create_strategy(mode, ReplaySettings::default());
    let path = Path::new("benches/fixtures").join(fixture);
    let mut output = Vec::new();

    strategy
        .process(&path, &mut output)
        .expect("Processing failed");
}

#[divan::bench]
fn sequential_small() {
    replay(ReplayMode::Sequential, "replay_small.csv");
}

#[divan::bench]
fn concurrent_small() {
    replay(ReplayMode::Concurrent, "replay_small.csv");
}

#[divan::bench]
fn sequential_medium() {
    replay(ReplayMode::Sequential, "replay_medium.csv");
}

#[divan::bench]
fn concurrent_medium() {
    replay(ReplayMode::Concurrent, "replay_medium.csv");
}
