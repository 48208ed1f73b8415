//! Market data abstraction.
//!
//! The engine depends only on the `MarketDataSource` trait, never on a
//! vendor transport. Historical mode does a one-time bulk `preload`, strategy
//! logic pulls windows through `history`, and live mode consumes the tick
//! iterator returned by `subscribe`.

mod csv_source;
mod static_source;

pub use csv_source::CsvDataSource;
pub use static_source::StaticDataSource;

use crate::events::Event;
use crate::observer::RunObserver;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Price fields a source can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// Field values at one instant.
pub type FieldValues = HashMap<Field, f64>;

/// Time series of field values for one symbol, ordered by timestamp.
#[derive(Debug, Clone, Default)]
pub struct SymbolSeries {
    pub symbol: String,
    pub points: BTreeMap<DateTime<Utc>, FieldValues>,
}

impl SymbolSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), points: BTreeMap::new() }
    }

    /// Copy of this series restricted to `[start, end]`.
    pub fn trim(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            symbol: self.symbol.clone(),
            points: self
                .points
                .range(start..=end)
                .map(|(t, v)| (*t, v.clone()))
                .collect(),
        }
    }

    /// One field as an ordered `(timestamp, value)` sequence, skipping
    /// instants where the field is absent.
    pub fn field(&self, field: Field) -> Vec<(DateTime<Utc>, f64)> {
        self.points
            .iter()
            .filter_map(|(t, v)| v.get(&field).map(|x| (*t, *x)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A single live price update.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
}

/// Structured data-layer errors.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for symbol '{symbol}'")]
    MissingSymbol { symbol: String },

    #[error("malformed row for '{symbol}': {detail}")]
    MalformedRow { symbol: String, detail: String },

    #[error("no data in requested range for '{symbol}'")]
    EmptyRange { symbol: String },

    #[error("history requested before preload")]
    NotPreloaded,

    // Field must not be named `source`: thiserror reserves that for the
    // error's cause.
    #[error("source '{name}' does not support live subscription")]
    SubscriptionUnsupported { name: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Abstract market data collaborator.
pub trait MarketDataSource: Send {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// One-time bulk fetch for the whole backtest horizon, extended backward
    /// by `max_lookback_days` so indicator warm-up windows are served from
    /// the same pull.
    fn preload(
        &mut self,
        symbols: &[String],
        fields: &[Field],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_lookback_days: u32,
    ) -> Result<(), DataError>;

    /// Per-symbol series covering `[asof - lookback_days, asof]`. The as-of
    /// instant is the simulated clock, passed explicitly by the caller.
    fn history(
        &self,
        symbols: &[String],
        fields: &[Field],
        lookback_days: u32,
        asof: DateTime<Utc>,
    ) -> Result<HashMap<String, SymbolSeries>, DataError>;

    /// Stream of live ticks for the live bridge. Historical-only sources
    /// return `DataError::SubscriptionUnsupported`.
    fn subscribe(
        &mut self,
        symbols: &[String],
    ) -> Result<Box<dyn Iterator<Item = PriceTick> + Send>, DataError>;
}

/// Build the timeline's Market events from preloaded close series.
///
/// The join across symbols is best-effort: the instants are the union of all
/// symbols' timestamps, and a symbol with no close at an instant is omitted
/// from that event (surfaced as a data gap, never fatal). Unequal trading
/// calendars therefore produce partial Market events rather than aborting.
pub fn market_events_from(
    series: &HashMap<String, SymbolSeries>,
    symbols: &[String],
    observer: &dyn RunObserver,
) -> Vec<Event> {
    let mut instants: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    for symbol in symbols {
        if let Some(s) = series.get(symbol) {
            instants.extend(s.points.keys().copied());
        }
    }

    let mut events = Vec::with_capacity(instants.len());
    for t in instants {
        let mut present = Vec::new();
        let mut prices = HashMap::new();
        for symbol in symbols {
            let close = series
                .get(symbol)
                .and_then(|s| s.points.get(&t))
                .and_then(|v| v.get(&Field::Close));
            match close {
                Some(px) => {
                    present.push(symbol.clone());
                    prices.insert(symbol.clone(), *px);
                }
                None => observer.on_data_gap(symbol, t),
            }
        }
        if !present.is_empty() {
            events.push(Event::Market { timestamp: t, symbols: present, prices });
        }
    }
    events
}

/// Start of the lookback window ending at `asof`.
pub(crate) fn lookback_start(asof: DateTime<Utc>, lookback_days: u32) -> DateTime<Utc> {
    asof - Duration::days(lookback_days as i64)
}
