//! Strategy runner — the state machine that drives a backtest.
//!
//! `Backtest<A>` owns one algorithm instance, one event kernel, one
//! portfolio, and one execution simulator; independent strategies share
//! nothing and may run on separate threads without synchronization.
//!
//! The loop drains the immediate queue completely before every timeline pop.
//! Scheduled callbacks are registered as closures bound to the concrete
//! algorithm type and addressed by id from the Scheduled event, so dispatch
//! never needs runtime type discrimination.

use crate::calendar::{resolve, DateRule, TimeRule, TradingCalendar};
use crate::data::{market_events_from, DataError, Field, MarketDataSource, SymbolSeries};
use crate::error::EngineError;
use crate::events::Event;
use crate::execution::{ExecutionSimulator, PerShareCommission};
use crate::live::LiveFeed;
use crate::observer::{RunObserver, SilentObserver};
use crate::portfolio::Portfolio;
use crate::scheduler::EventQueue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Keyed configuration store for strategy parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, f64>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Run identity and horizon.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub name: String,
    pub symbols: Vec<String>,
    pub initial_capital: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Extra lookback pulled before `start` so indicator windows are served
    /// from the preloaded data.
    pub max_lookback_days: u32,
    pub seed: u64,
}

impl BacktestConfig {
    pub fn new(
        name: impl Into<String>,
        symbols: Vec<String>,
        initial_capital: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            symbols,
            initial_capital,
            start,
            end,
            max_lookback_days: 0,
            seed: 0,
        }
    }

    pub fn with_max_lookback_days(mut self, days: u32) -> Self {
        self.max_lookback_days = days;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Runner states. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// What a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub final_equity: f64,
    pub cash: f64,
    pub returns: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub events_dispatched: u64,
    pub fills: u64,
    /// `Some` when terminated by a Stop event, `None` on end-of-history.
    pub stop_reason: Option<String>,
}

/// What a scheduled callback sees: the portfolio (read), the immediate queue
/// (through `order_target_percent`/`request_stop`), parameters, and history.
pub struct StrategyContext<'a> {
    now: DateTime<Utc>,
    portfolio: &'a Portfolio,
    queue: &'a mut EventQueue,
    params: &'a mut Params,
    data: &'a dyn MarketDataSource,
    observer: &'a dyn RunObserver,
}

impl<'a> StrategyContext<'a> {
    /// Current simulated time (the dispatched event's timestamp).
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.portfolio
    }

    pub fn params(&mut self) -> &mut Params {
        self.params
    }

    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key)
    }

    /// Emit a Signal targeting `percent` of equity in `symbol`.
    ///
    /// Pushed onto the immediate queue, so it drains (through Order and
    /// Fill) before the next timeline event. A guarded no-op (zero equity,
    /// non-finite target) is surfaced to the observer and skipped.
    pub fn order_target_percent(&mut self, symbol: &str, percent: f64) {
        match self.portfolio.order_target_percent(symbol, percent, self.now) {
            Some(signal) => self.queue.push_immediate(signal),
            None => self
                .observer
                .on_order_skipped(symbol, "zero equity or non-finite target"),
        }
    }

    /// Per-symbol history ending at the simulated clock.
    pub fn history(
        &self,
        symbols: &[String],
        fields: &[Field],
        lookback_days: u32,
    ) -> Result<HashMap<String, SymbolSeries>, DataError> {
        self.data.history(symbols, fields, lookback_days, self.now)
    }

    /// Ask the runner to stop after the current drain.
    pub fn request_stop(&mut self, reason: &str) {
        self.queue.push_immediate(Event::Stop {
            timestamp: self.now,
            reason: reason.to_string(),
        });
    }

    pub fn log(&self, message: &str) {
        self.observer.on_log(message);
    }
}

type Callback<A> = Box<dyn Fn(&mut A, &mut StrategyContext<'_>) + Send>;

/// One self-contained strategy run.
pub struct Backtest<A> {
    config: BacktestConfig,
    algo: A,
    callbacks: Vec<Callback<A>>,
    schedules: Vec<(DateRule, TimeRule)>,
    queue: EventQueue,
    portfolio: Portfolio,
    execution: ExecutionSimulator,
    data: Box<dyn MarketDataSource>,
    calendar: TradingCalendar,
    params: Params,
    observer: Box<dyn RunObserver>,
    state: RunState,
    events_dispatched: u64,
    fills: u64,
    stop_reason: Option<String>,
}

impl<A> Backtest<A> {
    pub fn new(
        algo: A,
        config: BacktestConfig,
        data: Box<dyn MarketDataSource>,
        calendar: TradingCalendar,
    ) -> Self {
        let portfolio = Portfolio::new(config.initial_capital, config.start);
        let execution = ExecutionSimulator::new(Box::<PerShareCommission>::default())
            .with_seed(config.seed, &config.name);
        Self {
            config,
            algo,
            callbacks: Vec::new(),
            schedules: Vec::new(),
            queue: EventQueue::new(),
            portfolio,
            execution,
            data,
            calendar,
            params: Params::new(),
            observer: Box::new(SilentObserver),
            state: RunState::Idle,
            events_dispatched: 0,
            fills: 0,
            stop_reason: None,
        }
    }

    pub fn with_execution(mut self, execution: ExecutionSimulator) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Register a callback. Its Scheduled events are resolved over the whole
    /// horizon once, when the run starts — after the historical Market bars
    /// are seeded, so a bar stamped at the same instant as a callback
    /// dispatches first and the callback reads that bar's prices.
    pub fn schedule_function<F>(&mut self, date_rule: DateRule, time_rule: TimeRule, callback: F)
    where
        F: Fn(&mut A, &mut StrategyContext<'_>) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self.schedules.push((date_rule, time_rule));
    }

    fn materialize_schedules(&mut self) {
        for id in 0..self.schedules.len() {
            let (date_rule, time_rule) = self.schedules[id];
            let instants = resolve(
                date_rule,
                time_rule,
                self.config.start,
                self.config.end,
                &self.calendar,
            );
            for instant in instants {
                self.queue.insert_timeline(Event::Scheduled { timestamp: instant, callback: id });
            }
        }
    }

    /// Insert an event directly onto the timeline (callers producing their
    /// own Market or Stop events).
    pub fn insert_event(&mut self, event: Event) {
        self.queue.insert_timeline(event);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn algo(&self) -> &A {
        &self.algo
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Historical run: preload, seed the timeline with Market events, then
    /// drive the loop until Stop or end-of-history.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        self.start()?;

        self.data.preload(
            &self.config.symbols,
            &[Field::Open, Field::Close],
            self.config.start,
            self.config.end,
            self.config.max_lookback_days,
        )?;
        let horizon_days = (self.config.end - self.config.start).num_days().max(0) as u32 + 1;
        let history = self.data.history(
            &self.config.symbols,
            &[Field::Close],
            horizon_days,
            self.config.end,
        )?;
        let market_events =
            market_events_from(&history, &self.config.symbols, self.observer.as_ref());
        for event in market_events {
            self.queue.insert_timeline(event);
        }
        // Bars first, then schedules: at equal instants the FIFO tie-break
        // dispatches a bar before any callback scheduled at that instant.
        self.materialize_schedules();

        while let Some(event) = self.queue.pop_next() {
            if self.dispatch(event)? {
                break;
            }
        }
        self.state = RunState::Stopped;
        Ok(self.summary())
    }

    /// Live run: merge producer events into the timeline before every pop;
    /// block on the channel when both queues are empty. Terminates on a Stop
    /// event; a disconnect without one is a stuck state.
    pub fn run_live(&mut self, feed: LiveFeed) -> Result<RunSummary, EngineError> {
        self.start()?;
        self.materialize_schedules();

        loop {
            while let Some(event) = feed.try_recv() {
                self.queue.insert_timeline(event);
            }
            match self.queue.pop_next() {
                Some(event) => {
                    if self.dispatch(event)? {
                        break;
                    }
                }
                None => match feed.recv() {
                    Some(event) => self.queue.insert_timeline(event),
                    None => {
                        return Err(EngineError::StuckState(
                            "live feed disconnected without a stop event".into(),
                        ))
                    }
                },
            }
        }
        self.state = RunState::Stopped;
        Ok(self.summary())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.state != RunState::Idle {
            return Err(EngineError::StuckState(
                "run may only be called once per backtest".into(),
            ));
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Dispatch one event. Returns `true` when the run must terminate.
    ///
    /// Every variant is matched; the only early exit is Stop. Sizing and
    /// fill failures are surfaced to the observer and skipped, never fatal.
    fn dispatch(&mut self, event: Event) -> Result<bool, EngineError> {
        self.events_dispatched += 1;
        match event {
            Event::Market { timestamp, prices, .. } => {
                self.portfolio.apply_market(timestamp, &prices);
            }
            Event::Signal { timestamp, symbol, target_percent } => {
                match self.execution.size_signal(&self.portfolio, timestamp, &symbol, target_percent)
                {
                    Ok(Some(order)) => self.queue.push_immediate(order),
                    Ok(None) => {}
                    Err(e) => self.observer.on_order_skipped(&symbol, &e.to_string()),
                }
            }
            Event::Order { timestamp, symbol, quantity } => {
                match self.execution.fill_order(&self.portfolio, timestamp, &symbol, quantity) {
                    Ok(outcome) => {
                        self.queue.push_immediate(outcome.fill);
                        if let Some(remainder) = outcome.deferred {
                            self.queue.insert_timeline(remainder);
                        }
                    }
                    Err(e) => self.observer.on_order_skipped(&symbol, &e.to_string()),
                }
            }
            Event::Fill { timestamp: _, ref symbol, quantity, cost, slippage, commission } => {
                self.observer.on_fill(&event);
                self.portfolio.apply_fill(symbol, quantity, cost, slippage, commission);
                self.fills += 1;
            }
            Event::Scheduled { timestamp, callback } => {
                if let Some(cb) = self.callbacks.get(callback) {
                    let mut ctx = StrategyContext {
                        now: timestamp,
                        portfolio: &self.portfolio,
                        queue: &mut self.queue,
                        params: &mut self.params,
                        data: self.data.as_ref(),
                        observer: self.observer.as_ref(),
                    };
                    cb(&mut self.algo, &mut ctx);
                }
            }
            Event::Stop { reason, .. } => {
                self.observer.on_stop(&reason);
                self.queue.clear();
                self.stop_reason = Some(reason);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn summary(&self) -> RunSummary {
        let final_equity = self.portfolio.equity();
        RunSummary {
            name: self.config.name.clone(),
            final_equity,
            cash: self.portfolio.cash,
            returns: final_equity / self.config.initial_capital - 1.0,
            total_commission: self.portfolio.total_commission,
            total_slippage: self.portfolio.total_slippage,
            events_dispatched: self.events_dispatched,
            fills: self.fills,
            stop_reason: self.stop_reason.clone(),
        }
    }
}
