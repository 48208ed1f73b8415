//! Engine error types.
//!
//! Data gaps and invalid orders are surfaced but never abort a run; the
//! clean terminations are a consumed `Stop` event or end-of-history with
//! both queues empty. `StuckState` marks the remaining abnormal paths.

use crate::data::DataError;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No price available for a symbol at a simulated instant.
    #[error("no price for {symbol} at {date}")]
    DataGap { symbol: String, date: DateTime<Utc> },

    /// A signal resolved to a quantity that cannot be ordered.
    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: String, reason: String },

    /// The runner can make no further progress while still `Running`.
    #[error("engine stuck: {0}")]
    StuckState(String),

    #[error(transparent)]
    Data(#[from] DataError),
}
