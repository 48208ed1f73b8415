//! Persisted equity-curve output.
//!
//! Append-only CSV record stream: truncated once at backtest start, then one
//! row per equity-curve entry. Destination path is deployment configuration.

use crate::portfolio::EquityPoint;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Writes `timestamp,equity,cash,returns` rows.
#[derive(Debug, Clone)]
pub struct EquityCurveWriter {
    path: PathBuf,
}

impl EquityCurveWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the destination and write the header row.
    pub fn truncate(&self) -> csv::Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(["timestamp", "equity", "cash", "returns"])?;
        writer.flush()?;
        Ok(())
    }

    /// Append one entry. The destination must have been truncated first.
    pub fn append(&self, point: &EquityPoint) -> csv::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(point)?;
        writer.flush()?;
        Ok(())
    }

    /// Truncate, then write the whole curve.
    pub fn write_all(&self, points: &[EquityPoint]) -> csv::Result<()> {
        self.truncate()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        for point in points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(())
    }
}
