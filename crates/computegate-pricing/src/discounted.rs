//! Basis-point discount layered over another policy

use crate::{PricingError, PricingPolicy, PricingResult};
use computegate_types::{ComputeUnits, TokenAmount};

const BPS_DENOMINATOR: u128 = 10_000;

/// `inner.price(units)` reduced by `discount_bps` / 10000
///
/// The discount is floored, so the requester never pays less than the exact
/// discounted price. Flooring a fraction (at most 1) of a non-decreasing
/// price keeps the result non-decreasing.
#[derive(Debug)]
pub struct DiscountedPricing {
    inner: Box<dyn PricingPolicy>,
    discount_bps: u16,
}

impl DiscountedPricing {
    pub fn new(inner: Box<dyn PricingPolicy>, discount_bps: u16) -> PricingResult<Self> {
        if discount_bps as u128 > BPS_DENOMINATOR {
            return Err(PricingError::InvalidConfig(format!(
                "discount of {discount_bps} bps exceeds 100%"
            )));
        }
        Ok(Self {
            inner,
            discount_bps,
        })
    }

    pub fn discount_bps(&self) -> u16 {
        self.discount_bps
    }
}

impl PricingPolicy for DiscountedPricing {
    fn name(&self) -> &'static str {
        "discounted"
    }

    fn price(&self, units: ComputeUnits) -> PricingResult<TokenAmount> {
        let full = self.inner.price(units)?.base_units();
        let bps = self.discount_bps as u128;
        // split to keep the multiplication inside u128
        let discount = full / BPS_DENOMINATOR * bps + full % BPS_DENOMINATOR * bps / BPS_DENOMINATOR;
        Ok(TokenAmount::new(full - discount))
    }
}
