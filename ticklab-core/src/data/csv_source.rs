//! CSV-backed historical data source.
//!
//! One file per symbol (`<dir>/<SYMBOL>.csv`) with a
//! `date,open,high,low,close,volume` header. Daily bars are stamped at the
//! configured bar time (default 16:00, the standard session close).

use super::{
    lookback_start, DataError, Field, MarketDataSource, PriceTick, SymbolSeries,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Historical source reading daily OHLCV bars from a directory of CSVs.
#[derive(Debug)]
pub struct CsvDataSource {
    dir: PathBuf,
    bar_time: NaiveTime,
    preloaded: Option<HashMap<String, SymbolSeries>>,
}

impl CsvDataSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bar_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            preloaded: None,
        }
    }

    /// Stamp daily bars at a different intraday time.
    pub fn with_bar_time(mut self, bar_time: NaiveTime) -> Self {
        self.bar_time = bar_time;
        self
    }

    fn read_symbol(
        &self,
        symbol: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SymbolSeries, DataError> {
        let path = self.dir.join(format!("{symbol}.csv"));
        if !path.exists() {
            return Err(DataError::MissingSymbol { symbol: symbol.to_string() });
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut series = SymbolSeries::new(symbol);
        for row in reader.deserialize::<CsvRow>() {
            let row = row.map_err(|e| DataError::MalformedRow {
                symbol: symbol.to_string(),
                detail: e.to_string(),
            })?;
            let t = row.date.and_time(self.bar_time).and_utc();
            if t < begin || t > end {
                continue;
            }
            let values = series.points.entry(t).or_default();
            values.insert(Field::Open, row.open);
            values.insert(Field::High, row.high);
            values.insert(Field::Low, row.low);
            values.insert(Field::Close, row.close);
            values.insert(Field::Volume, row.volume);
        }

        if series.is_empty() {
            return Err(DataError::EmptyRange { symbol: symbol.to_string() });
        }
        Ok(series)
    }
}

impl MarketDataSource for CsvDataSource {
    fn name(&self) -> &str {
        "csv"
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
            loaded.insert(symbol.clone(), self.read_symbol(symbol, begin, end)?);
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
        _symbols: &[String],
    ) -> Result<Box<dyn Iterator<Item = PriceTick> + Send>, DataError> {
        Err(DataError::SubscriptionUnsupported { name: "csv".into() })
    }
}
