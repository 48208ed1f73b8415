//! TickLab Core — discrete-event backtesting/execution engine.
//!
//! This crate contains the simulation kernel:
//! - Closed event taxonomy with millisecond timestamps
//! - Dual-queue scheduler (immediate FIFO + time-ordered timeline)
//! - Date/time rule resolver for scheduled strategy callbacks
//! - Portfolio ledger with the equity accounting identity
//! - Execution simulator (sizing, lognormal slippage, pluggable commission)
//! - Strategy runner state machine (historical and live modes)
//! - Live feed bridge over message passing

pub mod calendar;
pub mod data;
pub mod error;
pub mod events;
pub mod execution;
pub mod live;
pub mod observer;
pub mod portfolio;
pub mod report;
pub mod rng;
pub mod scheduler;
pub mod strategy;

pub use calendar::{resolve, DateRule, TimeRule, TradingCalendar};
pub use error::EngineError;
pub use events::Event;
pub use execution::{BrokerCostModel, ExecutionSimulator, NoCommission, PerShareCommission};
pub use observer::{RunObserver, SilentObserver, StdoutObserver};
pub use portfolio::{EquityPoint, Portfolio};
pub use scheduler::EventQueue;
pub use strategy::{Backtest, BacktestConfig, Params, RunState, RunSummary, StrategyContext};
