//! Run observer — callback surface for non-fatal run conditions.
//!
//! Data gaps and skipped orders are surfaced here and the run proceeds.
//! The default methods are no-ops, so observers implement only what they
//! care about.

use crate::events::Event;
use chrono::{DateTime, Utc};

pub trait RunObserver: Send {
    /// A symbol had no price at an instant; its Market contribution was omitted.
    fn on_data_gap(&self, _symbol: &str, _timestamp: DateTime<Utc>) {}

    /// A signal or order was skipped (zero equity, non-finite size, no price).
    fn on_order_skipped(&self, _symbol: &str, _reason: &str) {}

    /// An order was filled.
    fn on_fill(&self, _fill: &Event) {}

    /// A Stop event was consumed.
    fn on_stop(&self, _reason: &str) {}

    /// Free-form strategy log line.
    fn on_log(&self, _message: &str) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

/// Prints to stdout; used by the CLI.
#[derive(Debug, Default)]
pub struct StdoutObserver;

impl RunObserver for StdoutObserver {
    fn on_data_gap(&self, symbol: &str, timestamp: DateTime<Utc>) {
        println!("data gap: {symbol} at {timestamp}");
    }

    fn on_order_skipped(&self, symbol: &str, reason: &str) {
        println!("order skipped: {symbol}: {reason}");
    }

    fn on_fill(&self, fill: &Event) {
        println!("{fill}");
    }

    fn on_stop(&self, reason: &str) {
        println!("stopped: {reason}");
    }

    fn on_log(&self, message: &str) {
        println!("{message}");
    }
}
