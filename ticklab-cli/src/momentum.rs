//! Regression momentum strategy.
//!
//! Four scheduled jobs per trading day:
//! - 28 minutes after open: regress each symbol's closes over the lookback
//!   window and flag new trends (price crossing its regression line while the
//!   annualized slope clears a threshold).
//! - 30 minutes after open: turn flagged weights into target-percent orders,
//!   split across the active slots and capped at the leverage limit.
//! - every 10 minutes: ratchet trailing stops and exit immediately when one
//!   is breached.
//! - at the close: log the day's equity and append it to the output CSV.

use std::collections::HashMap;

use ticklab_core::calendar::{DateRule, TimeRule};
use ticklab_core::data::Field;
use ticklab_core::report::EquityCurveWriter;
use ticklab_core::strategy::{Backtest, StrategyContext};

/// Per-symbol trend state.
#[derive(Debug, Clone, Default)]
struct SymbolState {
    /// Annualized slope of the active trend; zero when flat.
    weight: f64,
    /// Whether the current weight has been turned into an order.
    bought: bool,
    /// Trailing stop; `None` until the first exit check after entry.
    stop_price: Option<f64>,
}

pub struct Momentum {
    symbols: Vec<String>,
    state: HashMap<String, SymbolState>,
    writer: Option<EquityCurveWriter>,
}

impl Momentum {
    pub fn new(symbols: Vec<String>) -> Self {
        let state = symbols
            .iter()
            .map(|s| (s.clone(), SymbolState { bought: true, ..Default::default() }))
            .collect();
        Self { symbols, state, writer: None }
    }

    /// Append the end-of-day equity row to `writer`'s destination.
    pub fn with_output(mut self, writer: EquityCurveWriter) -> Self {
        self.writer = Some(writer);
        self
    }
}

/// Register the four daily jobs on a backtest.
pub fn attach(bt: &mut Backtest<Momentum>) {
    bt.schedule_function(DateRule::EveryDay, TimeRule::every_minutes(10), exit_conditions);
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_open(0, 28), regression);
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_open(0, 30), trade);
    bt.schedule_function(DateRule::EveryDay, TimeRule::market_close(0, 0), report_performance);
}

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

fn param(ctx: &StrategyContext<'_>, key: &str, default: f64) -> f64 {
    ctx.param(key).unwrap_or(default)
}

/// Least-squares fit of `values` against their indices: `(slope, intercept)`.
fn calc_regression(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let (mut x_sum, mut y_sum, mut xx_sum, mut xy_sum) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        x_sum += x;
        y_sum += y;
        xx_sum += x * x;
        xy_sum += x * y;
    }
    let denom = n * xx_sum - x_sum * x_sum;
    let slope = (n * xy_sum - x_sum * y_sum) / denom;
    let intercept = (xx_sum * y_sum - xy_sum * x_sum) / denom;
    (slope, intercept)
}

/// Flag new trends and drop stale ones.
fn regression(algo: &mut Momentum, ctx: &mut StrategyContext<'_>) {
    // The residual check reads the last two bars, so the window is never
    // allowed to shrink below two.
    let lookback = (param(ctx, "lookback", 126.0) as usize).max(2);
    let slope_min = param(ctx, "slopemin", 0.252);
    let profit_take = param(ctx, "profittake", 1.96);

    // Calendar days overshoot the bar count so the window is always full.
    let lookback_days = (lookback as f64 * 1.6).ceil() as u32;
    let prices = match ctx.history(&algo.symbols, &[Field::Close], lookback_days) {
        Ok(p) => p,
        Err(e) => {
            ctx.log(&format!("regression skipped: {e}"));
            return;
        }
    };

    for symbol in &algo.symbols {
        let Some(series) = prices.get(symbol) else { continue };
        let closes: Vec<f64> = series
            .field(Field::Close)
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        if closes.len() < 2 {
            continue;
        }
        let window = &closes[closes.len().saturating_sub(lookback)..];
        let k = window.len() as f64;

        let (slope, intercept) = calc_regression(window);
        // Return per year relative to the fitted level.
        let annualized = slope / intercept * TRADING_DAYS_PER_YEAR;
        if !annualized.is_finite() {
            continue;
        }
        // Residuals of the last two bars against the fitted line.
        let delta1 = window[window.len() - 1] - (slope * (k - 1.0) + intercept);
        let delta2 = window[window.len() - 2] - (slope * (k - 2.0) + intercept);
        let mean = window.iter().sum::<f64>() / k;
        let sd = (window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / k).sqrt();

        let state = algo.state.get_mut(symbol).unwrap();

        // An active trend whose slope flips direction is abandoned.
        if (state.weight > 0.0 && annualized < 0.0) || (state.weight < 0.0 && annualized > 0.0) {
            state.weight = 0.0;
            state.bought = false;
            ctx.log(&format!("v slope reversed, dropping {symbol}"));
        }

        if annualized > slope_min {
            if delta1 > 0.0 && delta2 < 0.0 && state.weight == 0.0 {
                state.stop_price = None;
                state.weight = annualized;
                state.bought = false;
                ctx.log(&format!("^ long {symbol} (slope {:.1}%)", annualized * 100.0));
            } else if delta1 > profit_take * sd && state.weight > 0.0 {
                state.weight = 0.0;
                state.bought = false;
                ctx.log(&format!("- profit take, exit long {symbol}"));
            }
        } else if annualized < -slope_min {
            if delta1 < 0.0 && delta2 > 0.0 && state.weight == 0.0 {
                state.stop_price = None;
                state.weight = annualized;
                state.bought = false;
                ctx.log(&format!("v short {symbol} (slope {:.1}%)", annualized * 100.0));
            } else if delta1 < -profit_take * sd && state.weight < 0.0 {
                state.weight = 0.0;
                state.bought = false;
                ctx.log(&format!("- profit take, exit short {symbol}"));
            }
        }
    }
}

/// Ratchet trailing stops and exit breached positions immediately.
fn exit_conditions(algo: &mut Momentum, ctx: &mut StrategyContext<'_>) {
    let lookback = param(ctx, "lookback", 126.0);

    let prices = match ctx.history(&algo.symbols, &[Field::Close], 4) {
        Ok(p) => p,
        Err(e) => {
            ctx.log(&format!("exit check skipped: {e}"));
            return;
        }
    };

    for symbol in algo.symbols.clone() {
        let state = algo.state.get_mut(&symbol).unwrap();
        if state.weight == 0.0 {
            state.stop_price = None;
            continue;
        }
        // Mean of the last few closes is more robust than a single print.
        let closes = prices
            .get(&symbol)
            .map(|s| s.field(Field::Close))
            .unwrap_or_default();
        if closes.is_empty() {
            continue;
        }
        let price = closes.iter().map(|(_, v)| v).sum::<f64>() / closes.len() as f64;

        // Stop distance is the trend's expected move over the lookback.
        let stop_loss = (state.weight * lookback / TRADING_DAYS_PER_YEAR).abs() + 1.0;

        if state.weight > 0.0 {
            match state.stop_price {
                None => state.stop_price = Some(price / stop_loss),
                Some(stop) => {
                    // Stops only tighten.
                    let stop = stop.max(price / stop_loss);
                    state.stop_price = Some(stop);
                    if price < stop {
                        ctx.log(&format!("x long stop hit for {symbol}"));
                        state.weight = 0.0;
                        state.bought = true;
                        state.stop_price = None;
                        ctx.order_target_percent(&symbol, 0.0);
                    }
                }
            }
        } else {
            match state.stop_price {
                None => state.stop_price = Some(price * stop_loss),
                Some(stop) => {
                    let stop = stop.min(price * stop_loss);
                    state.stop_price = Some(stop);
                    if price > stop {
                        ctx.log(&format!("x short stop hit for {symbol}"));
                        state.weight = 0.0;
                        state.bought = true;
                        state.stop_price = None;
                        ctx.order_target_percent(&symbol, 0.0);
                    }
                }
            }
        }
    }
}

/// Turn pending weights into target-percent orders.
fn trade(algo: &mut Momentum, ctx: &mut StrategyContext<'_>) {
    let multiple = param(ctx, "multiple", 2.0);
    let max_leverage = param(ctx, "maxleverage", 0.9);

    // Slots in play: active trends plus pending entries/exits.
    let slots = algo
        .state
        .values()
        .filter(|s| s.weight != 0.0 || !s.bought)
        .count()
        .max(1) as f64;

    for symbol in algo.symbols.clone() {
        let state = algo.state.get_mut(&symbol).unwrap();
        if state.bought {
            continue;
        }
        if state.weight == 0.0 {
            state.bought = true;
            ctx.order_target_percent(&symbol, 0.0);
            continue;
        }
        let percent = if state.weight > 0.0 {
            (state.weight * multiple).min(max_leverage) / slots
        } else {
            (state.weight * multiple).max(-max_leverage) / slots
        };
        if !percent.is_finite() {
            ctx.log("non-finite trade value, skipping");
            continue;
        }
        state.bought = true;
        ctx.log(&format!("order {symbol} to {:.1}%", percent * 100.0));
        ctx.order_target_percent(&symbol, percent);
    }
}

/// Log the day's equity and append it to the output CSV.
fn report_performance(algo: &mut Momentum, ctx: &mut StrategyContext<'_>) {
    let Some(point) = ctx.portfolio().equity_curve().last().copied() else { return };
    ctx.log(&format!(
        "return: {:.4}, value: {:.2}, cash: {:.2}",
        point.returns, point.equity, point.cash
    ));
    if let Some(writer) = &algo.writer {
        if let Err(e) = writer.append(&point) {
            ctx.log(&format!("equity write failed: {e}"));
        }
    }
}
