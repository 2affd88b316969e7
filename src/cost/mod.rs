//! # Cost Kernel
//!
//! Pricing table and savings arithmetic. The pricing table is pure and
//! immutable after construction: no interior mutability, no locking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const HOURS_PER_DAY: f64 = 24.0;
const HOURS_PER_MONTH: f64 = 24.0 * 30.0;
const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Pricing tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Standard on-demand pricing.
    OnDemand,
    /// Spot/preemptible pricing.
    Spot,
    /// Reserved/committed-use pricing.
    Reserved,
}

/// Key into the pricing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceKey {
    /// Cloud provider identifier (opaque string).
    pub provider: String,
    /// Region identifier (opaque string).
    pub region: String,
    /// Pricing tier.
    pub tier: Tier,
}

/// Per-resource hourly price.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Price {
    /// Price per full CPU core per hour.
    pub cpu_per_core_hour: f64,
    /// Price per GiB of memory per hour.
    pub memory_per_gb_hour: f64,
}

/// Immutable pricing table, keyed by `(provider, region, tier)`.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: HashMap<PriceKey, Price>,
}

impl PricingTable {
    /// Build a pricing table from a fixed set of entries. Once
    /// constructed, the table is never mutated.
    pub fn new(entries: impl IntoIterator<Item = (PriceKey, Price)>) -> Self {
        Self {
            prices: entries.into_iter().collect(),
        }
    }

    /// Look up the price for a key.
    pub fn price(&self, key: &PriceKey) -> Option<Price> {
        self.prices.get(key).copied()
    }
}

/// Hourly cost of a resource allocation at a given price.
///
/// Cost is linear in `(millicores/1000)` and `(bytes/2^30)`.
pub fn hourly_cost(millicores: f64, bytes: f64, price: Price) -> f64 {
    let cores = millicores / 1000.0;
    let gib = bytes / BYTES_PER_GIB;
    cores * price.cpu_per_core_hour + gib * price.memory_per_gb_hour
}

/// Cost projected over several standard horizons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostProjection {
    /// Cost per hour.
    pub hourly: f64,
    /// Cost per day.
    pub daily: f64,
    /// Cost per 30-day month.
    pub monthly: f64,
    /// Cost per 365-day year.
    pub yearly: f64,
}

impl CostProjection {
    /// Derive a full projection from an hourly cost.
    pub fn from_hourly(hourly: f64) -> Self {
        Self {
            hourly,
            daily: hourly * HOURS_PER_DAY,
            monthly: hourly * HOURS_PER_MONTH,
            yearly: hourly * HOURS_PER_YEAR,
        }
    }

    /// Scale every horizon by a replica count.
    pub fn scale_by_replicas(&self, replicas: u32) -> Self {
        let factor = replicas as f64;
        Self {
            hourly: self.hourly * factor,
            daily: self.daily * factor,
            monthly: self.monthly * factor,
            yearly: self.yearly * factor,
        }
    }
}

/// Savings between a current and recommended allocation's monthly cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    /// Current monthly cost.
    pub current: f64,
    /// Recommended monthly cost.
    pub recommended: f64,
    /// `current - recommended`.
    pub amount: f64,
    /// Percent reduction; `0.0` when `current == 0.0`.
    pub percent: f64,
}

impl Savings {
    /// Compute savings between two monthly costs.
    pub fn compute(current: f64, recommended: f64) -> Self {
        let amount = current - recommended;
        let percent = if current == 0.0 {
            0.0
        } else {
            (amount / current) * 100.0
        };
        Self {
            current,
            recommended,
            amount,
            percent,
        }
    }

    /// Scale both costs (and thus the amount) by a replica count. Percent
    /// is invariant under uniform scaling and is left unchanged.
    pub fn scale_by_replicas(&self, replicas: u32) -> Self {
        let factor = replicas as f64;
        Self {
            current: self.current * factor,
            recommended: self.recommended * factor,
            amount: self.amount * factor,
            percent: self.percent,
        }
    }
}
