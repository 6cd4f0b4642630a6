//! Marginal bracket pricing
//!
//! Units are charged bracket by bracket, the way income tax brackets work:
//! with brackets `[up to 100 @ 10, rest @ 5]`, 150 units cost
//! `100 * 10 + 50 * 5`. Every marginal cost is non-negative, so the total is
//! monotone whether bracket costs rise or fall.

use crate::{PricingError, PricingPolicy, PricingResult};
use computegate_types::{ComputeUnits, TokenAmount};
use serde::{Deserialize, Serialize};

/// One pricing bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    /// Inclusive upper bound of the bracket in cumulative units; `None` for
    /// the final, unbounded bracket
    #[serde(default)]
    pub up_to: Option<u64>,
    /// Cost of each unit inside this bracket
    pub unit_cost: TokenAmount,
}

impl PriceTier {
    pub fn bounded(up_to: u64, unit_cost: TokenAmount) -> Self {
        Self {
            up_to: Some(up_to),
            unit_cost,
        }
    }

    pub fn unbounded(unit_cost: TokenAmount) -> Self {
        Self {
            up_to: None,
            unit_cost,
        }
    }
}

/// Bracketed marginal pricing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredPricing {
    tiers: Vec<PriceTier>,
}

impl TieredPricing {
    /// Build from brackets ordered by strictly ascending bounds, with only the
    /// last bracket unbounded
    pub fn new(tiers: Vec<PriceTier>) -> PricingResult<Self> {
        let Some((last, bounded)) = tiers.split_last() else {
            return Err(PricingError::InvalidConfig(
                "tiered pricing needs at least one tier".to_string(),
            ));
        };
        if last.up_to.is_some() {
            return Err(PricingError::InvalidConfig(
                "the last tier must be unbounded".to_string(),
            ));
        }

        let mut previous = 0u64;
        for (index, tier) in bounded.iter().enumerate() {
            let Some(bound) = tier.up_to else {
                return Err(PricingError::InvalidConfig(format!(
                    "tier {index} is unbounded but is not the last tier"
                )));
            };
            if bound <= previous {
                return Err(PricingError::InvalidConfig(format!(
                    "tier {index} bound {bound} must exceed {previous}"
                )));
            }
            previous = bound;
        }

        Ok(Self { tiers })
    }

    /// Brackets with a falling unit cost: the first `step` units at
    /// `start_cost`, each following `step` units `decay_bps` cheaper, until
    /// `floor_cost` is reached
    pub fn decaying(
        step: u64,
        start_cost: TokenAmount,
        decay_bps: u16,
        floor_cost: TokenAmount,
    ) -> PricingResult<Self> {
        if step == 0 {
            return Err(PricingError::InvalidConfig(
                "decay step must be positive".to_string(),
            ));
        }
        if decay_bps == 0 || decay_bps > 10_000 {
            return Err(PricingError::InvalidConfig(format!(
                "decay of {decay_bps} bps is outside 1..=10000"
            )));
        }

        let mut tiers = Vec::new();
        let mut cost = start_cost.base_units();
        let floor = floor_cost.base_units();
        let mut bound = 0u64;
        while cost > floor {
            bound = bound.checked_add(step).ok_or_else(|| {
                PricingError::InvalidConfig("decay schedule exceeds unit range".to_string())
            })?;
            tiers.push(PriceTier::bounded(bound, TokenAmount::new(cost)));
            let cut = cost / 10_000 * decay_bps as u128
                + cost % 10_000 * decay_bps as u128 / 10_000;
            cost = cost.saturating_sub(cut.max(1));
        }
        tiers.push(PriceTier::unbounded(TokenAmount::new(cost.max(floor))));

        Self::new(tiers)
    }

    pub fn tiers(&self) -> &[PriceTier] {
        &self.tiers
    }
}

impl PricingPolicy for TieredPricing {
    fn name(&self) -> &'static str {
        "tiered"
    }

    fn price(&self, units: ComputeUnits) -> PricingResult<TokenAmount> {
        let wanted = units.get();
        let overflow = || PricingError::Overflow { units: wanted };

        let mut total = TokenAmount::ZERO;
        let mut lower = 0u64;
        for tier in &self.tiers {
            if wanted <= lower {
                break;
            }
            let upper = tier.up_to.unwrap_or(u64::MAX).min(wanted);
            let in_tier = upper - lower;
            let cost = tier
                .unit_cost
                .checked_mul(in_tier as u128)
                .map_err(|_| overflow())?;
            total = total.checked_add(cost).map_err(|_| overflow())?;
            lower = upper;
        }

        Ok(total)
    }
}
