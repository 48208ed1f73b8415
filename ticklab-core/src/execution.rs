//! Execution simulation — Signal → Order → Fill.
//!
//! Sizing truncates toward zero; fills are a simplified cost model, not a
//! matching engine. Slippage is a lognormal draw scaled by notional, with
//! the draw taken from a deterministically seeded stream so identical runs
//! produce identical fills. Commission is delegated to a pluggable
//! `BrokerCostModel`.

use crate::error::EngineError;
use crate::events::Event;
use crate::portfolio::Portfolio;
use crate::rng::seeded_rng;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;

/// Simulated broker commission policy.
pub trait BrokerCostModel: Send {
    fn commission(&self, symbol: &str, quantity: i64, price: f64) -> f64;
    fn name(&self) -> &str;
}

/// Per-share rate with a per-order minimum (interactive-broker style).
#[derive(Debug, Clone, Copy)]
pub struct PerShareCommission {
    pub rate: f64,
    pub minimum: f64,
}

impl Default for PerShareCommission {
    fn default() -> Self {
        Self { rate: 0.005, minimum: 1.0 }
    }
}

impl BrokerCostModel for PerShareCommission {
    fn commission(&self, _symbol: &str, quantity: i64, _price: f64) -> f64 {
        (quantity.unsigned_abs() as f64 * self.rate).max(self.minimum)
    }

    fn name(&self) -> &str {
        "per-share"
    }
}

/// Zero commission.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommission;

impl BrokerCostModel for NoCommission {
    fn commission(&self, _symbol: &str, _quantity: i64, _price: f64) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Lognormal slippage parameters (process-wide simulation constants).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LognormalSlippage {
    pub mean: f64,
    pub sd: f64,
}

/// A fill plus an optionally deferred remainder order (split).
#[derive(Debug)]
pub struct FillOutcome {
    pub fill: Event,
    /// Remainder of a capped order, re-enqueued for a later bar.
    pub deferred: Option<Event>,
}

/// Converts strategy intent into ledger mutations.
pub struct ExecutionSimulator {
    cost_model: Box<dyn BrokerCostModel>,
    slippage: Option<LognormalSlippage>,
    rng: StdRng,
    per_bar_cap: Option<i64>,
    requeue_delay: Duration,
}

impl ExecutionSimulator {
    pub fn new(cost_model: Box<dyn BrokerCostModel>) -> Self {
        Self {
            cost_model,
            slippage: None,
            rng: seeded_rng(0, "execution"),
            per_bar_cap: None,
            requeue_delay: Duration::days(1),
        }
    }

    /// No commission, no slippage.
    pub fn frictionless() -> Self {
        Self::new(Box::new(NoCommission))
    }

    pub fn with_slippage(mut self, mean: f64, sd: f64) -> Self {
        self.slippage = Some(LognormalSlippage { mean, sd });
        self
    }

    /// Seed the slippage stream; `label` is typically the strategy name so
    /// parallel strategies draw independently.
    pub fn with_seed(mut self, master_seed: u64, label: &str) -> Self {
        self.rng = seeded_rng(master_seed, label);
        self
    }

    /// Cap per-bar fill size; the remainder is split into a later order.
    pub fn with_per_bar_cap(mut self, cap: i64, requeue_delay: Duration) -> Self {
        self.per_bar_cap = Some(cap.max(1));
        self.requeue_delay = requeue_delay;
        self
    }

    /// Signal → Order.
    ///
    /// `delta = trunc(target_percent * equity / last_price) - position`;
    /// zero delta produces no order. A missing or non-positive price, or a
    /// non-finite share count, is an `InvalidOrder` — surfaced by the
    /// runner, never fatal.
    pub fn size_signal(
        &self,
        portfolio: &Portfolio,
        timestamp: DateTime<Utc>,
        symbol: &str,
        target_percent: f64,
    ) -> Result<Option<Event>, EngineError> {
        let price = portfolio.last_price.get(symbol).copied().ok_or_else(|| {
            EngineError::DataGap { symbol: symbol.to_string(), date: timestamp }
        })?;
        if price <= 0.0 {
            return Err(EngineError::InvalidOrder {
                symbol: symbol.to_string(),
                reason: format!("non-positive price {price}"),
            });
        }

        let target_shares = (target_percent * portfolio.equity() / price).trunc();
        if !target_shares.is_finite() {
            return Err(EngineError::InvalidOrder {
                symbol: symbol.to_string(),
                reason: "non-finite target share count".into(),
            });
        }

        let delta = target_shares as i64 - portfolio.position(symbol);
        if delta == 0 {
            return Ok(None);
        }
        Ok(Some(Event::Order {
            timestamp,
            symbol: symbol.to_string(),
            quantity: delta,
        }))
    }

    /// Order → Fill.
    ///
    /// Cost is the last known price. When a per-bar cap is configured and
    /// the order exceeds it, the order quantity is rewritten to the cap and
    /// the remainder is returned as a deferred Order for a later bar.
    pub fn fill_order(
        &mut self,
        portfolio: &Portfolio,
        timestamp: DateTime<Utc>,
        symbol: &str,
        quantity: i64,
    ) -> Result<FillOutcome, EngineError> {
        if quantity == 0 {
            return Err(EngineError::InvalidOrder {
                symbol: symbol.to_string(),
                reason: "zero quantity".into(),
            });
        }
        let cost = portfolio.last_price.get(symbol).copied().ok_or_else(|| {
            EngineError::DataGap { symbol: symbol.to_string(), date: timestamp }
        })?;

        let (fill_qty, deferred) = match self.per_bar_cap {
            Some(cap) if quantity.abs() > cap => {
                let capped = cap * quantity.signum();
                let remainder = Event::Order {
                    timestamp: timestamp + self.requeue_delay,
                    symbol: symbol.to_string(),
                    quantity: quantity - capped,
                };
                (capped, Some(remainder))
            }
            _ => (quantity, None),
        };

        let slippage = self.draw_slippage() * fill_qty.unsigned_abs() as f64 * cost;
        let commission = self.cost_model.commission(symbol, fill_qty, cost);

        Ok(FillOutcome {
            fill: Event::Fill {
                timestamp,
                symbol: symbol.to_string(),
                quantity: fill_qty,
                cost,
                slippage,
                commission,
            },
            deferred,
        })
    }

    /// One lognormal draw (Box–Muller over the seeded stream), or zero when
    /// slippage is disabled.
    fn draw_slippage(&mut self) -> f64 {
        let Some(params) = self.slippage else { return 0.0 };
        // gen() is [0, 1); flip to (0, 1] so the log argument is never zero.
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        (params.mean + params.sd * z).exp()
    }
}
