//! Event taxonomy — the closed set of occurrences driving a simulation.
//!
//! Every event carries a millisecond-resolution timestamp. Events are created
//! by exactly one producer (data feed, runner, execution simulator, or live
//! bridge), moved into a queue, and consumed exactly once at dispatch. The
//! only permitted mutation after enqueue is an `Order` quantity rewrite by
//! the execution simulator when an order is split across bars.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Index into a strategy's callback registry.
///
/// A `Scheduled` event binds an instant to a callback by id instead of
/// carrying a function pointer, so dispatch needs no runtime type
/// discrimination on the strategy.
pub type CallbackId = usize;

/// One simulated occurrence.
#[derive(Debug, Clone)]
pub enum Event {
    /// Price update for one or more symbols, produced by the data layer.
    Market {
        timestamp: DateTime<Utc>,
        symbols: Vec<String>,
        prices: HashMap<String, f64>,
    },
    /// Strategy intent: reach `target_percent` of equity in `symbol`.
    Signal {
        timestamp: DateTime<Utc>,
        symbol: String,
        target_percent: f64,
    },
    /// Concrete share quantity derived from a signal. Positive = buy.
    Order {
        timestamp: DateTime<Utc>,
        symbol: String,
        quantity: i64,
    },
    /// Simulated execution result, with friction broken out.
    Fill {
        timestamp: DateTime<Utc>,
        symbol: String,
        quantity: i64,
        cost: f64,
        slippage: f64,
        commission: f64,
    },
    /// A strategy callback due at this instant.
    Scheduled {
        timestamp: DateTime<Utc>,
        callback: CallbackId,
    },
    /// Terminate the run. Produced at most once per run.
    Stop {
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Market { timestamp, .. }
            | Event::Signal { timestamp, .. }
            | Event::Order { timestamp, .. }
            | Event::Fill { timestamp, .. }
            | Event::Scheduled { timestamp, .. }
            | Event::Stop { timestamp, .. } => *timestamp,
        }
    }

    /// Composite ordering key: epoch milliseconds.
    ///
    /// The timeline is ordered by this single integer; equality means
    /// same-instant, resolved by insertion order.
    pub fn sort_key(&self) -> i64 {
        self.timestamp().timestamp_millis()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Market { .. } => "Market",
            Event::Signal { .. } => "Signal",
            Event::Order { .. } => "Order",
            Event::Fill { .. } => "Fill",
            Event::Scheduled { .. } => "Scheduled",
            Event::Stop { .. } => "Stop",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Market { timestamp, symbols, .. } => {
                write!(f, "Market@{} [{}]", timestamp, symbols.join(", "))
            }
            Event::Signal { timestamp, symbol, target_percent } => {
                write!(f, "Signal@{} {} -> {:.4}", timestamp, symbol, target_percent)
            }
            Event::Order { timestamp, symbol, quantity } => {
                write!(f, "Order@{} {} x {}", timestamp, symbol, quantity)
            }
            Event::Fill { timestamp, symbol, quantity, cost, slippage, commission } => {
                write!(
                    f,
                    "Fill@{} {} x {} @ {:.2} (slip {:.4}, comm {:.4})",
                    timestamp, symbol, quantity, cost, slippage, commission
                )
            }
            Event::Scheduled { timestamp, callback } => {
                write!(f, "Scheduled@{} #{}", timestamp, callback)
            }
            Event::Stop { timestamp, reason } => {
                write!(f, "Stop@{} ({})", timestamp, reason)
            }
        }
    }
}
