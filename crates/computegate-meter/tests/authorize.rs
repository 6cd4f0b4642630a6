use std::sync::Arc;
use std::time::Duration;

use computegate_chain::{ChargeFault, InMemoryLedger};
use computegate_meter::{Authorization, ComputeMeter, MeterConfig, RetryConfig};
use computegate_pricing::{FixedRatePricing, PriceTier, TieredPricing};
use computegate_types::{ChainError, ChainErrorKind, ComputeUnits, GateError, Identity, TokenAmount};

const UNIT_COST: TokenAmount = TokenAmount::new(1_000_000);

fn requester() -> Identity {
    Identity::new("requester-1")
}

async fn funded(balance: u128) -> InMemoryLedger {
    let ledger = InMemoryLedger::new("treasury");
    ledger.set_balance("requester-1", TokenAmount::new(balance)).await;
    ledger
}

fn quick_config() -> MeterConfig {
    MeterConfig {
        balance_timeout: Duration::from_millis(200),
        charge_timeout: Duration::from_millis(200),
        balance_retry: RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        },
        serialize_per_requester: false,
    }
}

fn meter(ledger: &InMemoryLedger) -> ComputeMeter {
    ComputeMeter::with_config(ledger.clone(), FixedRatePricing::new(UNIT_COST), quick_config())
}

#[tokio::test]
async fn test_admits_and_charges_the_price() {
    let ledger = funded(5_000_000).await;
    let outcome = meter(&ledger)
        .authorize(&requester(), ComputeUnits::new(3))
        .await
        .unwrap();

    let receipt = outcome.receipt().expect("admitted");
    assert_eq!(receipt.amount, TokenAmount::new(3_000_000));
    assert_eq!(receipt.holder, requester());
    assert_eq!(ledger.charge_calls(), 1);
    assert_eq!(ledger.balance_of(&requester()).await, TokenAmount::new(2_000_000));
}

#[tokio::test]
async fn test_denies_without_charging() {
    let ledger = funded(5_000_000).await;
    let outcome = meter(&ledger)
        .authorize(&requester(), ComputeUnits::new(6))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Authorization::Denied {
            required: TokenAmount::new(6_000_000),
            balance: TokenAmount::new(5_000_000),
            shortfall: TokenAmount::new(1_000_000),
        }
    );
    assert_eq!(ledger.charge_calls(), 0);
    assert_eq!(ledger.balance_of(&requester()).await, TokenAmount::new(5_000_000));
}

#[tokio::test]
async fn test_exact_balance_is_admitted() {
    let ledger = funded(3_000_000).await;
    let outcome = meter(&ledger)
        .authorize(&requester(), ComputeUnits::new(3))
        .await
        .unwrap();
    assert!(outcome.is_admitted());
    assert_eq!(ledger.balance_of(&requester()).await, TokenAmount::ZERO);
}

#[tokio::test]
async fn test_invalid_requests_fail_before_io() {
    let ledger = funded(5_000_000).await;
    let meter = meter(&ledger);

    let err = meter
        .authorize(&requester(), ComputeUnits::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::InvalidRequest { .. }));

    let err = meter
        .authorize(&Identity::new("has space"), ComputeUnits::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::InvalidIdentity { .. }));

    let overflowing = ComputeMeter::with_config(
        ledger.clone(),
        FixedRatePricing::new(TokenAmount::new(u128::MAX)),
        quick_config(),
    );
    let err = overflowing
        .authorize(&requester(), ComputeUnits::new(2))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::InvalidRequest { .. }));

    assert_eq!(ledger.balance_calls(), 0);
    assert_eq!(ledger.charge_calls(), 0);
}

#[tokio::test]
async fn test_zero_price_is_rejected() {
    let ledger = funded(5_000_000).await;
    let free = ComputeMeter::with_config(
        ledger.clone(),
        FixedRatePricing::new(TokenAmount::ZERO),
        quick_config(),
    );
    let err = free
        .authorize(&requester(), ComputeUnits::new(3))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::InvalidRequest { .. }));
    assert_eq!(ledger.charge_calls(), 0);
}

#[tokio::test]
async fn test_balance_outage_is_unavailable_not_denied() {
    let ledger = funded(5_000_000).await;
    ledger
        .fail_balance_with(Some(ChainError::connectivity("connection refused")))
        .await;

    let err = meter(&ledger)
        .authorize(&requester(), ComputeUnits::new(1))
        .await
        .unwrap_err();

    match err {
        GateError::MeteringUnavailable { cause } => {
            assert_eq!(cause.kind(), ChainErrorKind::Connectivity)
        }
        other => panic!("expected MeteringUnavailable, got {other:?}"),
    }
    // first attempt plus two retries
    assert_eq!(ledger.balance_calls(), 3);
    assert_eq!(ledger.charge_calls(), 0);
}

#[tokio::test]
async fn test_unknown_balance_failure_is_not_retried() {
    let ledger = funded(5_000_000).await;
    ledger
        .fail_balance_with(Some(ChainError::unknown("garbled response")))
        .await;

    let err = meter(&ledger)
        .authorize(&requester(), ComputeUnits::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::MeteringUnavailable { .. }));
    assert_eq!(ledger.balance_calls(), 1);
}

#[tokio::test]
async fn test_slow_balance_read_times_out() {
    let ledger = funded(5_000_000).await;
    ledger.set_latency(Some(Duration::from_secs(5))).await;

    let mut config = quick_config();
    config.balance_retry = RetryConfig::disabled();
    let meter = ComputeMeter::with_config(ledger.clone(), FixedRatePricing::new(UNIT_COST), config);

    let err = meter
        .authorize(&requester(), ComputeUnits::new(1))
        .await
        .unwrap_err();
    match err {
        GateError::MeteringUnavailable { cause } => {
            assert_eq!(cause.kind(), ChainErrorKind::Connectivity)
        }
        other => panic!("expected MeteringUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unconfirmed_charge_is_never_admitted() {
    let ledger = funded(5_000_000).await;
    ledger
        .fault_charges(Some(ChargeFault::SettleThenLoseConfirmation))
        .await;

    let outcome = meter(&ledger)
        .authorize(&requester(), ComputeUnits::new(3))
        .await
        .unwrap();

    match outcome {
        Authorization::ChargeFailed { required, error } => {
            assert_eq!(required, TokenAmount::new(3_000_000));
            assert_eq!(error.kind(), ChainErrorKind::Confirmation);
            assert!(error.transaction_id().is_some());
        }
        other => panic!("expected ChargeFailed, got {other:?}"),
    }
    // funds moved even though the request was not admitted
    assert_eq!(ledger.balance_of(&requester()).await, TokenAmount::new(2_000_000));
}

#[tokio::test]
async fn test_every_charge_failure_kind_is_charge_failed() {
    for error in [
        ChainError::insufficient_funds("balance moved"),
        ChainError::submission("blockhash expired"),
        ChainError::confirmation(Some("tx".into()), "timed out"),
        ChainError::unknown("?"),
    ] {
        let ledger = funded(5_000_000).await;
        ledger.fault_charges(Some(ChargeFault::Reject(error.clone()))).await;

        let outcome = meter(&ledger)
            .authorize(&requester(), ComputeUnits::new(1))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Authorization::ChargeFailed {
                required: UNIT_COST,
                error,
            }
        );
    }
}

#[tokio::test]
async fn test_charge_exceeding_timeout_is_confirmation() {
    let ledger = funded(5_000_000).await;
    let mut config = quick_config();
    config.balance_timeout = Duration::from_secs(5);
    config.charge_timeout = Duration::from_millis(100);
    let meter = ComputeMeter::with_config(ledger.clone(), FixedRatePricing::new(UNIT_COST), config);
    ledger.set_latency(Some(Duration::from_millis(150))).await;

    let outcome = meter
        .authorize(&requester(), ComputeUnits::new(1))
        .await
        .unwrap();
    match outcome {
        Authorization::ChargeFailed { error, .. } => {
            assert_eq!(error.kind(), ChainErrorKind::Confirmation)
        }
        other => panic!("expected ChargeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_requests_admit_at_most_one() {
    let ledger = funded(3_000_000).await;
    ledger.set_latency(Some(Duration::from_millis(20))).await;
    let meter = Arc::new(meter(&ledger));
    let who = requester();

    let (a, b) = tokio::join!(
        meter.authorize(&who, ComputeUnits::new(3)),
        meter.authorize(&who, ComputeUnits::new(3)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_admitted()).count(), 1);
    let loser = outcomes.iter().find(|o| !o.is_admitted()).unwrap();
    match loser {
        Authorization::ChargeFailed { error, .. } => {
            assert_eq!(error.kind(), ChainErrorKind::InsufficientFunds)
        }
        Authorization::Denied { .. } => {}
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(ledger.balance_of(&requester()).await, TokenAmount::ZERO);
}

#[tokio::test]
async fn test_serialized_requests_see_each_others_charges() {
    let ledger = funded(3_000_000).await;
    ledger.set_latency(Some(Duration::from_millis(20))).await;
    let mut config = quick_config();
    config.balance_timeout = Duration::from_secs(1);
    config.charge_timeout = Duration::from_secs(1);
    config.serialize_per_requester = true;
    let meter = Arc::new(ComputeMeter::with_config(
        ledger.clone(),
        FixedRatePricing::new(UNIT_COST),
        config,
    ));

    let requests = (0..4).map(|_| {
        let meter = Arc::clone(&meter);
        async move { meter.authorize(&requester(), ComputeUnits::new(3)).await }
    });
    let outcomes: Vec<_> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_admitted()).count(), 1);
    assert!(outcomes
        .iter()
        .filter(|o| !o.is_admitted())
        .all(|o| matches!(o, Authorization::Denied { .. })));
    assert_eq!(ledger.charge_calls(), 1);
}

#[tokio::test]
async fn test_tiered_pricing_flows_through() {
    let ledger = funded(10_000_000).await;
    let tiers = TieredPricing::new(vec![
        PriceTier::bounded(2, TokenAmount::new(1_000_000)),
        PriceTier::unbounded(TokenAmount::new(500_000)),
    ])
    .unwrap();
    let meter = ComputeMeter::with_config(ledger.clone(), tiers, quick_config());

    let outcome = meter
        .authorize(&requester(), ComputeUnits::new(4))
        .await
        .unwrap();
    assert_eq!(outcome.required(), TokenAmount::new(3_000_000));
    assert!(outcome.is_admitted());
    assert_eq!(meter.backend().family().as_str(), "memory");
}
