//! Compute Gate Pricing - compute units to token cost
//!
//! A [`PricingPolicy`] is a pure function of the requested units:
//!
//! - **Deterministic**: the same units always price the same under one
//!   policy instance (no clock, no counters, no interior mutability)
//! - **Monotone**: `units1 <= units2` implies `price(units1) <= price(units2)`
//!
//! Three policies ship with the crate:
//!
//! | Policy      | Cost of `n` units                                     |
//! |-------------|-------------------------------------------------------|
//! | Fixed rate  | `n * unit_cost`                                       |
//! | Tiered      | each unit priced by the bracket it falls in           |
//! | Discounted  | inner price minus a basis-point discount (floored)    |
//!
//! Decaying prices are tiered brackets with falling unit costs
//! ([`TieredPricing::decaying`], or `policy = "decaying"` in configuration).

pub mod discounted;
pub mod fixed;
pub mod tiered;

pub use discounted::DiscountedPricing;
pub use fixed::{FixedRatePricing, DEFAULT_UNIT_COST};
pub use tiered::{PriceTier, TieredPricing};

use computegate_types::{ComputeUnits, TokenAmount};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pricing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Price of {units} units overflows the amount range")]
    Overflow { units: u64 },

    #[error("Invalid pricing configuration: {0}")]
    InvalidConfig(String),
}

pub type PricingResult<T> = Result<T, PricingError>;

/// Maps requested compute units to the token amount they cost
pub trait PricingPolicy: Send + Sync + fmt::Debug {
    /// Short policy name for logs
    fn name(&self) -> &'static str;

    /// Price `units`, in the token's smallest units
    fn price(&self, units: ComputeUnits) -> PricingResult<TokenAmount>;
}

impl<P: PricingPolicy + ?Sized> PricingPolicy for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn price(&self, units: ComputeUnits) -> PricingResult<TokenAmount> {
        (**self).price(units)
    }
}

/// Serializable policy description, as found in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PricingConfig {
    FixedRate {
        unit_cost: TokenAmount,
    },
    Tiered {
        tiers: Vec<PriceTier>,
    },
    /// Tiered brackets generated from a start cost that falls by
    /// `decay_bps` every `step` units down to `floor_cost`
    Decaying {
        step: u64,
        start_cost: TokenAmount,
        decay_bps: u16,
        floor_cost: TokenAmount,
    },
    Discounted {
        discount_bps: u16,
        inner: Box<PricingConfig>,
    },
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig::FixedRate {
            unit_cost: DEFAULT_UNIT_COST,
        }
    }
}

impl PricingConfig {
    /// Validate and build the described policy
    pub fn build(&self) -> PricingResult<Box<dyn PricingPolicy>> {
        Ok(match self {
            PricingConfig::FixedRate { unit_cost } => Box::new(FixedRatePricing::new(*unit_cost)),
            PricingConfig::Tiered { tiers } => Box::new(TieredPricing::new(tiers.clone())?),
            PricingConfig::Decaying {
                step,
                start_cost,
                decay_bps,
                floor_cost,
            } => Box::new(TieredPricing::decaying(
                *step,
                *start_cost,
                *decay_bps,
                *floor_cost,
            )?),
            PricingConfig::Discounted {
                discount_bps,
                inner,
            } => Box::new(DiscountedPricing::new(inner.build()?, *discount_bps)?),
        })
    }
}
