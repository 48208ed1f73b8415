//! Portfolio ledger — cash, positions, last-known prices, equity curve.
//!
//! Mutated only from the runner's dispatch step. The accounting identity
//! `equity == cash + Σ position[s] * last_price[s]` must hold immediately
//! after every Market or Fill application, within 1e-6 relative tolerance.

use crate::events::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One append-only equity-curve entry. `returns` is cumulative:
/// `equity / initial_capital - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    pub returns: f64,
}

/// Holdings snapshot plus history.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, i64>,
    pub last_price: HashMap<String, f64>,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub current_time: DateTime<Utc>,
    equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64, start_time: DateTime<Utc>) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            last_price: HashMap::new(),
            total_commission: 0.0,
            total_slippage: 0.0,
            current_time: start_time,
            equity_curve: Vec::new(),
        }
    }

    /// `cash + Σ position * last_price`.
    pub fn equity(&self) -> f64 {
        let position_value: f64 = self
            .positions
            .iter()
            .map(|(sym, qty)| *qty as f64 * self.last_price.get(sym).copied().unwrap_or(0.0))
            .sum();
        self.cash + position_value
    }

    pub fn position(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    /// Express intent to reach `percent` of equity in `symbol`.
    ///
    /// Emits a Signal event; sizing and fill mechanics are deferred to the
    /// execution simulator. Fails safe — returns `None` and emits nothing —
    /// when equity is zero or the target value is non-finite, so NaN/Inf
    /// never propagates into sizing.
    pub fn order_target_percent(
        &self,
        symbol: &str,
        percent: f64,
        now: DateTime<Utc>,
    ) -> Option<Event> {
        let equity = self.equity();
        if equity == 0.0 {
            return None;
        }
        if !(percent * equity).is_finite() {
            return None;
        }
        Some(Event::Signal {
            timestamp: now,
            symbol: symbol.to_string(),
            target_percent: percent,
        })
    }

    /// Apply a Market event: refresh last prices, advance simulated time,
    /// and append an equity-curve entry keyed at the event's timestamp.
    pub fn apply_market(&mut self, timestamp: DateTime<Utc>, prices: &HashMap<String, f64>) {
        for (symbol, price) in prices {
            self.last_price.insert(symbol.clone(), *price);
        }
        self.current_time = timestamp;
        let equity = self.equity();
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity,
            cash: self.cash,
            returns: equity / self.initial_capital - 1.0,
        });
    }

    /// Apply a Fill: move cash, adjust the position, accumulate friction.
    pub fn apply_fill(
        &mut self,
        symbol: &str,
        quantity: i64,
        cost: f64,
        slippage: f64,
        commission: f64,
    ) {
        self.cash -= quantity as f64 * cost + commission + slippage;
        *self.positions.entry(symbol.to_string()).or_insert(0) += quantity;
        self.total_commission += commission;
        self.total_slippage += slippage;
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }
}
