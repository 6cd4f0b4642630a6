use computegate_pricing::{
    DiscountedPricing, FixedRatePricing, PriceTier, PricingPolicy, TieredPricing,
};
use computegate_types::{ComputeUnits, TokenAmount};
use proptest::prelude::*;

fn assert_monotone(policy: &dyn PricingPolicy, a: u64, b: u64) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let p_lo = policy.price(ComputeUnits::new(lo));
    let p_hi = policy.price(ComputeUnits::new(hi));
    match (p_lo, p_hi) {
        (Ok(lo_price), Ok(hi_price)) => assert!(
            lo_price <= hi_price,
            "{}: price({lo}) = {lo_price} > price({hi}) = {hi_price}",
            policy.name()
        ),
        // once the cheaper request overflows, the dearer one must too
        (Err(_), hi) => assert!(hi.is_err()),
        (Ok(_), Err(_)) => {}
    }
}

fn tier_strategy() -> impl Strategy<Value = TieredPricing> {
    (
        prop::collection::vec((1u64..1_000, 0u128..1_000_000), 0..6),
        0u128..1_000_000,
    )
        .prop_map(|(steps, last_cost)| {
            let mut bound = 0u64;
            let mut tiers: Vec<PriceTier> = steps
                .into_iter()
                .map(|(width, cost)| {
                    bound += width;
                    PriceTier::bounded(bound, TokenAmount::new(cost))
                })
                .collect();
            tiers.push(PriceTier::unbounded(TokenAmount::new(last_cost)));
            TieredPricing::new(tiers).expect("generated tiers are ordered")
        })
}

proptest! {
    #[test]
    fn fixed_rate_is_monotone(cost in 0u128..u64::MAX as u128, a in any::<u64>(), b in any::<u64>()) {
        let policy = FixedRatePricing::new(TokenAmount::new(cost));
        assert_monotone(&policy, a, b);
    }

    #[test]
    fn tiered_is_monotone(policy in tier_strategy(), a in 0u64..10_000, b in 0u64..10_000) {
        assert_monotone(&policy, a, b);
    }

    #[test]
    fn decaying_is_monotone(
        step in 1u64..500,
        start in 1u128..10_000_000,
        decay in 1u16..=10_000,
        a in 0u64..20_000,
        b in 0u64..20_000,
    ) {
        let policy = TieredPricing::decaying(step, TokenAmount::new(start), decay, TokenAmount::new(start / 10))
            .expect("valid decay schedule");
        assert_monotone(&policy, a, b);
    }

    #[test]
    fn discounted_is_monotone(cost in 0u128..1_000_000_000, bps in 0u16..=10_000, a in any::<u32>(), b in any::<u32>()) {
        let policy = DiscountedPricing::new(Box::new(FixedRatePricing::new(TokenAmount::new(cost))), bps)
            .expect("bps in range");
        assert_monotone(&policy, a as u64, b as u64);
    }

    #[test]
    fn pricing_is_deterministic(policy in tier_strategy(), units in 0u64..10_000) {
        let first = policy.price(ComputeUnits::new(units));
        let second = policy.price(ComputeUnits::new(units));
        prop_assert_eq!(first, second);
    }
}

#[test]
fn observed_rate_examples() {
    let policy = FixedRatePricing::default();
    assert_eq!(policy.price(ComputeUnits::new(3)).unwrap(), TokenAmount::new(3_000_000));
    assert_eq!(policy.price(ComputeUnits::new(6)).unwrap(), TokenAmount::new(6_000_000));
}
