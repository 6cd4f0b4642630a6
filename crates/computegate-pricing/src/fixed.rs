//! Fixed linear rate: `amount = units * unit_cost`

use crate::{PricingError, PricingPolicy, PricingResult};
use computegate_types::{ComputeUnits, TokenAmount};

/// Cost of one compute unit under the default policy (0.001 of a
/// 9-decimal token)
pub const DEFAULT_UNIT_COST: TokenAmount = TokenAmount::new(1_000_000);

/// Linear multiplier pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRatePricing {
    unit_cost: TokenAmount,
}

impl FixedRatePricing {
    pub fn new(unit_cost: TokenAmount) -> Self {
        Self { unit_cost }
    }

    pub fn unit_cost(&self) -> TokenAmount {
        self.unit_cost
    }
}

impl Default for FixedRatePricing {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_COST)
    }
}

impl PricingPolicy for FixedRatePricing {
    fn name(&self) -> &'static str {
        "fixed_rate"
    }

    fn price(&self, units: ComputeUnits) -> PricingResult<TokenAmount> {
        self.unit_cost
            .checked_mul(units.get() as u128)
            .map_err(|_| PricingError::Overflow { units: units.get() })
    }
}
