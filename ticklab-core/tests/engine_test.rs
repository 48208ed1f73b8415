//! End-to-end runner tests: dispatch rules, draining, stop precedence,
//! sizing, and the equity accounting identity under friction.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::{Arc, Mutex};
use ticklab_core::calendar::{DateRule, TimeRule, TradingCalendar};
use ticklab_core::data::StaticDataSource;
use ticklab_core::error::EngineError;
use ticklab_core::events::Event;
use ticklab_core::execution::{ExecutionSimulator, PerShareCommission};
use ticklab_core::observer::RunObserver;
use ticklab_core::strategy::{Backtest, BacktestConfig, RunState};

fn date(d: u32) -> NaiveDate {
    // March 2021: the 1st is a Monday.
    NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
}

fn close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap()
}

fn horizon(first: u32, last: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        date(first).and_hms_opt(0, 0, 0).unwrap().and_utc(),
        date(last).and_hms_opt(23, 59, 59).unwrap().and_utc(),
    )
}

fn source_with(symbol_closes: &[(&str, &[(u32, f64)])]) -> StaticDataSource {
    let mut src = StaticDataSource::new();
    for (symbol, closes) in symbol_closes {
        src = src.with_daily_closes(
            symbol,
            close_time(),
            closes.iter().map(|(d, px)| (date(*d), *px)),
        );
    }
    src
}

fn config(symbols: &[&str], first: u32, last: u32) -> BacktestConfig {
    let (start, end) = horizon(first, last);
    BacktestConfig::new(
        "test",
        symbols.iter().map(|s| s.to_string()).collect(),
        100_000.0,
        start,
        end,
    )
}

/// Observer that records fills and data gaps for assertions.
#[derive(Default)]
struct Recorder {
    fills: Arc<Mutex<Vec<(DateTime<Utc>, String, i64)>>>,
    gaps: Arc<Mutex<Vec<String>>>,
}

impl RunObserver for Recorder {
    fn on_fill(&self, fill: &Event) {
        if let Event::Fill { timestamp, symbol, quantity, .. } = fill {
            self.fills.lock().unwrap().push((*timestamp, symbol.clone(), *quantity));
        }
    }

    fn on_data_gap(&self, symbol: &str, _timestamp: DateTime<Utc>) {
        self.gaps.lock().unwrap().push(symbol.to_string());
    }
}

#[test]
fn target_percent_becomes_a_sized_fill() {
    // equity 100_000, price 50, target 0.5 -> floor(100_000 * 0.5 / 50) = 1000
    let src = source_with(&[("X", &[(1, 50.0)])]);
    let mut bt = Backtest::new((), config(&["X"], 1, 1), Box::new(src), TradingCalendar::us_default())
        .with_execution(ExecutionSimulator::frictionless());
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 30), |_, ctx| {
        ctx.order_target_percent("X", 0.5);
    });

    let summary = bt.run().unwrap();
    assert_eq!(summary.fills, 1);
    assert_eq!(bt.portfolio().position("X"), 1_000);
    assert!((summary.final_equity - 100_000.0).abs() < 1e-9);
    assert!((bt.portfolio().cash - 50_000.0).abs() < 1e-9);
}

#[test]
fn scheduled_signals_drain_before_next_timeline_event() {
    // Day 1's callback emits three signals; every resulting fill must land
    // before day 2 is touched, which day 2's callback verifies.
    struct Algo {
        day: u32,
        day2_saw_positions: Option<bool>,
    }
    let src = source_with(&[
        ("X", &[(1, 50.0), (2, 51.0)]),
        ("Y", &[(1, 50.0), (2, 52.0)]),
        ("Z", &[(1, 50.0), (2, 49.0)]),
    ]);
    let recorder = Recorder::default();
    let fills = Arc::clone(&recorder.fills);

    let mut bt = Backtest::new(
        Algo { day: 0, day2_saw_positions: None },
        config(&["X", "Y", "Z"], 1, 2),
        Box::new(src),
        TradingCalendar::us_default(),
    )
    .with_execution(ExecutionSimulator::frictionless())
    .with_observer(Box::new(recorder));

    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 30), |algo: &mut Algo, ctx| {
        algo.day += 1;
        if algo.day == 1 {
            ctx.order_target_percent("X", 0.2);
            ctx.order_target_percent("Y", 0.2);
            ctx.order_target_percent("Z", 0.2);
        } else {
            // 100_000 * 0.2 / 50 = 400 each, already applied.
            let p = ctx.portfolio();
            algo.day2_saw_positions =
                Some(p.position("X") == 400 && p.position("Y") == 400 && p.position("Z") == 400);
        }
    });

    let summary = bt.run().unwrap();
    assert_eq!(summary.fills, 3);
    assert_eq!(bt.algo().day2_saw_positions, Some(true));

    // All three fills happened at day 1's scheduled instant.
    let day1_sched = date(1).and_time(close_time()).and_utc() + chrono::Duration::minutes(30);
    let fills = fills.lock().unwrap();
    assert_eq!(fills.len(), 3);
    assert!(fills.iter().all(|(t, _, _)| *t == day1_sched));
}

#[test]
fn stop_preempts_later_timeline_events() {
    let src = source_with(&[("X", &[(1, 50.0)])]);
    let mut bt = Backtest::new((), config(&["X"], 1, 1), Box::new(src), TradingCalendar::us_default());
    // Stop at 10:00, market close event at 16:00 the same day.
    bt.insert_event(Event::Stop {
        timestamp: date(1).and_hms_opt(10, 0, 0).unwrap().and_utc(),
        reason: "halt".into(),
    });

    let summary = bt.run().unwrap();
    assert_eq!(summary.stop_reason.as_deref(), Some("halt"));
    assert_eq!(summary.events_dispatched, 1);
    // The Market event was discarded, never applied.
    assert!(bt.portfolio().equity_curve().is_empty());
}

#[test]
fn strategy_requested_stop_ends_the_run() {
    let src = source_with(&[("X", &[(1, 50.0), (2, 51.0), (3, 52.0)])]);
    let mut bt = Backtest::new((), config(&["X"], 1, 3), Box::new(src), TradingCalendar::us_default());
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 30), |_, ctx| {
        ctx.request_stop("target reached");
    });

    let summary = bt.run().unwrap();
    assert_eq!(summary.stop_reason.as_deref(), Some("target reached"));
    // Day 1 market applied, then the day-1 callback stopped the run.
    assert_eq!(bt.portfolio().equity_curve().len(), 1);
}

#[test]
fn end_of_history_is_a_clean_non_stop_termination() {
    let src = source_with(&[("X", &[(1, 50.0), (2, 51.0)])]);
    let mut bt = Backtest::new((), config(&["X"], 1, 2), Box::new(src), TradingCalendar::us_default());

    let summary = bt.run().unwrap();
    assert!(summary.stop_reason.is_none());
    assert_eq!(bt.state(), RunState::Stopped);
    assert_eq!(bt.portfolio().equity_curve().len(), 2);
}

#[test]
fn second_run_is_a_stuck_state() {
    let src = source_with(&[("X", &[(1, 50.0)])]);
    let mut bt = Backtest::new((), config(&["X"], 1, 1), Box::new(src), TradingCalendar::us_default());
    bt.run().unwrap();
    assert!(matches!(bt.run(), Err(EngineError::StuckState(_))));
}

#[test]
fn equity_identity_holds_under_friction() {
    // Prices don't move after the fill, so every equity change is friction.
    let src = source_with(&[("X", &[(1, 50.0)])]);
    let exec = ExecutionSimulator::new(Box::<PerShareCommission>::default())
        .with_slippage(-6.0, 0.25)
        .with_seed(42, "test");
    let mut bt = Backtest::new((), config(&["X"], 1, 1), Box::new(src), TradingCalendar::us_default())
        .with_execution(exec);
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 30), |_, ctx| {
        ctx.order_target_percent("X", 0.5);
    });

    bt.run().unwrap();
    let p = bt.portfolio();
    assert!(p.total_slippage > 0.0);
    assert!(p.total_commission > 0.0);
    let expected = 100_000.0 - p.total_commission - p.total_slippage;
    assert!(
        (p.equity() - expected).abs() / expected < 1e-6,
        "equity {} vs expected {}",
        p.equity(),
        expected
    );
}

#[test]
fn callback_fires_once_per_day_over_the_horizon() {
    struct Counter {
        instants: Vec<DateTime<Utc>>,
    }
    let src = source_with(&[("X", &[(1, 50.0), (2, 51.0), (3, 52.0)])]);
    let mut bt = Backtest::new(
        Counter { instants: Vec::new() },
        config(&["X"], 1, 3),
        Box::new(src),
        TradingCalendar::us_default(),
    );
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_open(0, 30), |algo: &mut Counter, ctx| {
        algo.instants.push(ctx.now());
    });

    bt.run().unwrap();
    let instants = &bt.algo().instants;
    assert_eq!(instants.len(), 3);
    assert!(instants.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        instants[0],
        date(1).and_hms_opt(10, 0, 0).unwrap().and_utc()
    );
}

#[test]
fn close_callback_sees_the_same_day_close() {
    // Bars are stamped at 16:00, exactly when a market_close(0, 0) callback
    // fires. The bar must dispatch first, so the callback reads that day's
    // price rather than the previous day's.
    struct Algo {
        seen: Vec<Option<f64>>,
    }
    let src = source_with(&[("X", &[(1, 50.0), (2, 60.0)])]);
    let mut bt = Backtest::new(
        Algo { seen: Vec::new() },
        config(&["X"], 1, 2),
        Box::new(src),
        TradingCalendar::us_default(),
    );
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 0), |algo: &mut Algo, ctx| {
        algo.seen.push(ctx.portfolio().last_price.get("X").copied());
    });

    bt.run().unwrap();
    assert_eq!(bt.algo().seen, vec![Some(50.0), Some(60.0)]);
}

#[test]
fn missing_symbol_dates_are_gaps_not_failures() {
    // Y only trades on day 1; day 2's market event omits it.
    let src = source_with(&[("X", &[(1, 50.0), (2, 51.0)]), ("Y", &[(1, 40.0)])]);
    let recorder = Recorder::default();
    let gaps = Arc::clone(&recorder.gaps);

    let mut bt = Backtest::new((), config(&["X", "Y"], 1, 2), Box::new(src), TradingCalendar::us_default())
        .with_observer(Box::new(recorder));
    let summary = bt.run().unwrap();

    assert!(summary.stop_reason.is_none());
    assert_eq!(bt.portfolio().equity_curve().len(), 2);
    assert_eq!(gaps.lock().unwrap().as_slice(), &["Y".to_string()]);
    // Y's last known price survives from day 1.
    assert_eq!(bt.portfolio().last_price["Y"], 40.0);
}

#[test]
fn split_order_remainder_fills_on_a_later_bar() {
    let src = source_with(&[("X", &[(1, 50.0), (2, 50.0)])]);
    let exec = ExecutionSimulator::frictionless()
        .with_per_bar_cap(600, chrono::Duration::days(1));
    let mut bt = Backtest::new((), config(&["X"], 1, 2), Box::new(src), TradingCalendar::us_default())
        .with_execution(exec);
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 30), |_, ctx| {
        if ctx.portfolio().position("X") == 0 {
            ctx.order_target_percent("X", 0.5); // wants 1000 shares
        }
    });

    let summary = bt.run().unwrap();
    assert_eq!(summary.fills, 2);
    assert_eq!(bt.portfolio().position("X"), 1_000);
}
