//! TickLab CLI — run event-driven backtests from TOML strategy configs.
//!
//! Commands:
//! - `run` — execute one backtest and write its equity curve CSV
//! - `run-many` — execute several configs in parallel, one thread each

mod momentum;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use ticklab_core::calendar::TradingCalendar;
use ticklab_core::data::CsvDataSource;
use ticklab_core::observer::{SilentObserver, StdoutObserver};
use ticklab_core::report::EquityCurveWriter;
use ticklab_core::strategy::{Backtest, BacktestConfig, Params, RunSummary};

#[derive(Parser)]
#[command(
    name = "ticklab",
    about = "TickLab CLI — discrete-event backtesting engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest from a TOML strategy config.
    Run {
        /// Path to the TOML config file.
        config: PathBuf,

        /// Directory of per-symbol CSV files (date,open,high,low,close,volume).
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Directory for equity curve output.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Suppress per-event output.
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Execute several configs in parallel, one strategy per thread.
    RunMany {
        /// Paths to TOML config files.
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Directory of per-symbol CSV files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Directory for equity curve output.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
}

/// On-disk strategy definition.
#[derive(Debug, Clone, Deserialize)]
struct StrategySpec {
    name: String,
    symbols: Vec<String>,
    initial_capital: f64,
    /// Horizon dates, inclusive (YYYY-MM-DD).
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    max_lookback_days: u32,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    params: Params,
}

impl StrategySpec {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let spec: StrategySpec = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if spec.symbols.is_empty() {
            bail!("config {} lists no symbols", path.display());
        }
        if spec.end < spec.start {
            bail!("config {}: end date precedes start date", path.display());
        }
        Ok(spec)
    }

    fn to_config(&self) -> BacktestConfig {
        BacktestConfig::new(
            &self.name,
            self.symbols.clone(),
            self.initial_capital,
            self.start.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            self.end.and_hms_opt(23, 59, 59).unwrap().and_utc(),
        )
        .with_max_lookback_days(self.max_lookback_days)
        .with_seed(self.seed)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, data_dir, output_dir, quiet } => {
            let spec = StrategySpec::load(&config)?;
            let summary = run_one(&spec, &data_dir, &output_dir, quiet)?;
            print_summary(&summary);
            Ok(())
        }
        Commands::RunMany { configs, data_dir, output_dir } => {
            run_many(&configs, &data_dir, &output_dir)
        }
    }
}

fn run_one(
    spec: &StrategySpec,
    data_dir: &Path,
    output_dir: &Path,
    quiet: bool,
) -> Result<RunSummary> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output dir {}", output_dir.display()))?;
    let curve_path = output_dir.join(format!("{}.csv", spec.name));
    let writer = EquityCurveWriter::new(&curve_path);
    writer
        .truncate()
        .with_context(|| format!("truncating {}", curve_path.display()))?;

    let algo = momentum::Momentum::new(spec.symbols.clone()).with_output(writer);
    let source = CsvDataSource::new(data_dir);
    let mut bt = Backtest::new(algo, spec.to_config(), Box::new(source), TradingCalendar::us_default())
        .with_params(spec.params.clone());
    if !quiet {
        bt = bt.with_observer(Box::new(StdoutObserver));
    } else {
        bt = bt.with_observer(Box::new(SilentObserver));
    }
    momentum::attach(&mut bt);

    let summary = bt
        .run()
        .with_context(|| format!("running strategy '{}'", spec.name))?;

    let summary_path = output_dir.join(format!("{}.summary.json", spec.name));
    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(&summary_path, json)
        .with_context(|| format!("writing {}", summary_path.display()))?;
    Ok(summary)
}

fn run_many(configs: &[PathBuf], data_dir: &Path, output_dir: &Path) -> Result<()> {
    let specs: Vec<StrategySpec> = configs
        .iter()
        .map(|p| StrategySpec::load(p))
        .collect::<Result<_>>()?;

    // Strategies share nothing, so each runs on its own worker thread.
    let results: Vec<(String, Result<RunSummary>)> = specs
        .par_iter()
        .map(|spec| (spec.name.clone(), run_one(spec, data_dir, output_dir, true)))
        .collect();

    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(summary) => print_summary(summary),
            Err(e) => {
                eprintln!("{name}: failed: {e:#}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} runs failed", results.len());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("── {} ──", summary.name);
    println!("  final equity   {:>14.2}", summary.final_equity);
    println!("  return         {:>13.2}%", summary.returns * 100.0);
    println!("  cash           {:>14.2}", summary.cash);
    println!("  commission     {:>14.2}", summary.total_commission);
    println!("  slippage       {:>14.2}", summary.total_slippage);
    println!("  fills          {:>14}", summary.fills);
    println!("  events         {:>14}", summary.events_dispatched);
    match &summary.stop_reason {
        Some(reason) => println!("  stopped: {reason}"),
        None => println!("  completed: end of history"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_parses_with_params() {
        let spec: StrategySpec = toml::from_str(
            r#"
            name = "momentum-demo"
            symbols = ["SPY", "QQQ"]
            initial_capital = 100000.0
            start = "2021-01-04"
            end = "2021-06-30"
            max_lookback_days = 200
            seed = 7

            [params]
            lookback = 126.0
            maxleverage = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(spec.symbols.len(), 2);
        assert_eq!(spec.params.get("lookback"), Some(126.0));
        assert_eq!(spec.seed, 7);
    }

    #[test]
    fn spec_defaults_are_optional() {
        let spec: StrategySpec = toml::from_str(
            r#"
            name = "bare"
            symbols = ["SPY"]
            initial_capital = 50000.0
            start = "2021-01-04"
            end = "2021-02-01"
            "#,
        )
        .unwrap();
        assert_eq!(spec.max_lookback_days, 0);
        assert_eq!(spec.seed, 0);
        assert_eq!(spec.params, Params::new());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ticklab-bad-spec-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            name = "backwards"
            symbols = ["SPY"]
            initial_capital = 1000.0
            start = "2021-06-30"
            end = "2021-01-04"
            "#,
        )
        .unwrap();
        assert!(StrategySpec::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
