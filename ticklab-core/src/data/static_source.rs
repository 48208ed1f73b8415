//! In-memory data source — tests, demos, and simulated live subscriptions.

use super::{
    lookback_start, DataError, Field, MarketDataSource, PriceTick, SymbolSeries,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

/// A source backed entirely by pre-built series.
///
/// `subscribe` drains a queued tick script, which makes this the stand-in
/// for a live subscription in tests.
#[derive(Debug, Default)]
pub struct StaticDataSource {
    series: HashMap<String, SymbolSeries>,
    ticks: Vec<PriceTick>,
    preloaded: Option<HashMap<String, SymbolSeries>>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_series(&mut self, series: SymbolSeries) {
        self.series.insert(series.symbol.clone(), series);
    }

    /// Convenience: daily closes stamped at `bar_time` on each date.
    pub fn with_daily_closes(
        mut self,
        symbol: &str,
        bar_time: NaiveTime,
        closes: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let mut s = self
            .series
            .remove(symbol)
            .unwrap_or_else(|| SymbolSeries::new(symbol));
        for (date, px) in closes {
            let t = date.and_time(bar_time).and_utc();
            s.points.entry(t).or_default().insert(Field::Close, px);
        }
        self.series.insert(symbol.to_string(), s);
        self
    }

    /// Queue ticks for a later `subscribe` call, in script order.
    pub fn with_ticks(mut self, ticks: impl IntoIterator<Item = PriceTick>) -> Self {
        self.ticks.extend(ticks);
        self
    }
}

impl MarketDataSource for StaticDataSource {
    fn name(&self) -> &str {
        "static"
    }

    fn preload(
        &mut self,
        symbols: &[String],
        _fields: &[Field],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_lookback_days: u32,
    ) -> Result<(), DataError> {
        let begin = lookback_start(start, max_lookback_days);
        let mut loaded = HashMap::new();
        for symbol in symbols {
            let s = self
                .series
                .get(symbol)
                .ok_or_else(|| DataError::MissingSymbol { symbol: symbol.clone() })?;
            loaded.insert(symbol.clone(), s.trim(begin, end));
        }
        self.preloaded = Some(loaded);
        Ok(())
    }

    fn history(
        &self,
        symbols: &[String],
        _fields: &[Field],
        lookback_days: u32,
        asof: DateTime<Utc>,
    ) -> Result<HashMap<String, SymbolSeries>, DataError> {
        let preloaded = self.preloaded.as_ref().ok_or(DataError::NotPreloaded)?;
        let begin = lookback_start(asof, lookback_days);
        let mut out = HashMap::new();
        for symbol in symbols {
            let s = preloaded
                .get(symbol)
                .ok_or_else(|| DataError::MissingSymbol { symbol: symbol.clone() })?;
            out.insert(symbol.clone(), s.trim(begin, asof));
        }
        Ok(out)
    }

    fn subscribe(
        &mut self,
        symbols: &[String],
    ) -> Result<Box<dyn Iterator<Item = PriceTick> + Send>, DataError> {
        let wanted: Vec<String> = symbols.to_vec();
        let ticks: Vec<PriceTick> = std::mem::take(&mut self.ticks)
            .into_iter()
            .filter(|t| wanted.contains(&t.symbol))
            .collect();
        Ok(Box::new(ticks.into_iter()))
    }
}
