//! Criterion benchmarks for TickLab hot paths.
//!
//! Benchmarks:
//! 1. Timeline insertion (shuffled, sorted, and tie-heavy workloads)
//! 2. Full queue drain (insert then pop everything)
//! 3. End-to-end historical run over synthetic daily closes

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::seq::SliceRandom;

use ticklab_core::calendar::{DateRule, TimeRule, TradingCalendar};
use ticklab_core::data::StaticDataSource;
use ticklab_core::events::Event;
use ticklab_core::execution::ExecutionSimulator;
use ticklab_core::rng::seeded_rng;
use ticklab_core::scheduler::EventQueue;
use ticklab_core::strategy::{Backtest, BacktestConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_events(n: usize, shuffle: bool, tie_every: i64) -> Vec<Event> {
    let mut secs: Vec<i64> = (0..n as i64).map(|i| i / tie_every).collect();
    if shuffle {
        let mut rng = seeded_rng(7, "bench");
        secs.shuffle(&mut rng);
    }
    secs.into_iter()
        .map(|s| Event::Stop {
            timestamp: Utc.timestamp_opt(s, 0).unwrap(),
            reason: String::new(),
        })
        .collect()
}

fn bench_timeline_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("timeline_insert");
    for &n in &[1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("shuffled", n), &n, |b, &n| {
            let events = make_events(n, true, 1);
            b.iter(|| {
                let mut q = EventQueue::new();
                for e in events.iter().cloned() {
                    q.insert_timeline(black_box(e));
                }
                q
            });
        });
        group.bench_with_input(BenchmarkId::new("sorted", n), &n, |b, &n| {
            let events = make_events(n, false, 1);
            b.iter(|| {
                let mut q = EventQueue::new();
                for e in events.iter().cloned() {
                    q.insert_timeline(black_box(e));
                }
                q
            });
        });
        group.bench_with_input(BenchmarkId::new("tie_heavy", n), &n, |b, &n| {
            // 100 events per instant stresses the tie-break scan.
            let events = make_events(n, true, 100);
            b.iter(|| {
                let mut q = EventQueue::new();
                for e in events.iter().cloned() {
                    q.insert_timeline(black_box(e));
                }
                q
            });
        });
    }
    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let events = make_events(10_000, true, 1);
    c.bench_function("insert_then_drain_10k", |b| {
        b.iter(|| {
            let mut q = EventQueue::new();
            for e in events.iter().cloned() {
                q.insert_timeline(e);
            }
            let mut popped = 0u64;
            while let Some(e) = q.pop_next() {
                black_box(&e);
                popped += 1;
            }
            popped
        });
    });
}

fn bench_historical_run(c: &mut Criterion) {
    let first = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    let bar_time = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let days: Vec<NaiveDate> = (0..500)
        .map(|i| first + Duration::days(i))
        .filter(|d| TradingCalendar::us_default().is_trading_day(*d))
        .collect();
    let last = *days.last().unwrap();

    c.bench_function("daily_rebalance_500_days", |b| {
        b.iter(|| {
            let closes = days
                .iter()
                .enumerate()
                .map(|(i, d)| (*d, 100.0 + (i as f64 * 0.1).sin() * 10.0));
            let src = StaticDataSource::new().with_daily_closes("X", bar_time, closes);
            let config = BacktestConfig::new(
                "bench",
                vec!["X".to_string()],
                1_000_000.0,
                first.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                last.and_hms_opt(23, 59, 59).unwrap().and_utc(),
            );
            let mut bt = Backtest::new(
                (),
                config,
                Box::new(src),
                TradingCalendar::us_default(),
            )
            .with_execution(ExecutionSimulator::frictionless());
            bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 30), |_, ctx| {
                ctx.order_target_percent("X", 0.6);
            });
            black_box(bt.run().unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_timeline_insert,
    bench_drain,
    bench_historical_run
);
criterion_main!(benches);
