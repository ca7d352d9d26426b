//! Benchmarks for ticker parsing, store updates and report rendering

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_relay::config::DEFAULT_SYMBOLS;
use market_relay::format::format_snapshot;
use market_relay::parser::ParsedMessage;
use market_relay::store::{PricePoint, PriceStore, Symbol};
use rust_decimal::Decimal;
use std::str::FromStr;

fn create_entries() -> Vec<(Symbol, PricePoint)> {
    DEFAULT_SYMBOLS
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let point = PricePoint {
                last: Some(Decimal::from(65000) / Decimal::from(i as u32 * 7 + 1)),
                change_pct_24h: Some(Decimal::from_str("1.25").unwrap() - Decimal::from(i as u32)),
                ..PricePoint::unknown()
            };
            (Symbol::from(*s), point)
        })
        .collect()
}

fn benchmark_format_snapshot(c: &mut Criterion) {
    let entries = create_entries();

    c.bench_function("format_snapshot_8_symbols", |b| {
        b.iter(|| format_snapshot(black_box(&entries)))
    });
}

fn benchmark_parse_tickers(c: &mut Criterion) {
    let raw = r#"{"arg":{"channel":"tickers","instId":"BTC-USDT"},"data":[{"instId":"BTC-USDT","last":"65000.1","open24h":"64000","vol24h":"1234.5","ts":"1700000000000"}]}"#;

    c.bench_function("parse_tickers_push", |b| {
        b.iter(|| ParsedMessage::parse(black_box(raw)).unwrap())
    });
}

fn benchmark_store_set(c: &mut Criterion) {
    let store = PriceStore::new(DEFAULT_SYMBOLS.iter().copied());
    let symbol = Symbol::from("TRX-USDT");
    let point = PricePoint {
        last: Some(Decimal::from_str("7.125").unwrap()),
        ..PricePoint::unknown()
    };

    c.bench_function("store_set", |b| {
        b.iter(|| store.set(black_box(&symbol), point).unwrap())
    });

    c.bench_function("store_snapshot_all", |b| b.iter(|| store.snapshot_all()));
}

criterion_group!(
    benches,
    benchmark_format_snapshot,
    benchmark_parse_tickers,
    benchmark_store_set
);
criterion_main!(benches);
