//! The gate: price, check balance, charge, admit

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use computegate_chain::ChainBackend;
use computegate_pricing::{PricingError, PricingPolicy};
use computegate_types::{
    ChainError, ChainErrorKind, ComputeUnits, GateError, GateResult, Identity, TokenAmount,
};

use crate::config::MeterConfig;
use crate::outcome::Authorization;

/// Admits compute requests only after their price has been charged on-chain.
///
/// Stateless across calls apart from the optional per-requester lock table;
/// share it behind an `Arc` and call `authorize` concurrently.
pub struct ComputeMeter {
    backend: Box<dyn ChainBackend>,
    pricing: Box<dyn PricingPolicy>,
    config: MeterConfig,
    locks: DashMap<Identity, Arc<Mutex<()>>>,
}

impl ComputeMeter {
    pub fn new(
        backend: impl ChainBackend + 'static,
        pricing: impl PricingPolicy + 'static,
    ) -> Self {
        Self::with_config(backend, pricing, MeterConfig::default())
    }

    pub fn with_config(
        backend: impl ChainBackend + 'static,
        pricing: impl PricingPolicy + 'static,
        config: MeterConfig,
    ) -> Self {
        Self::from_boxed(Box::new(backend), Box::new(pricing), config)
    }

    pub fn from_boxed(
        backend: Box<dyn ChainBackend>,
        pricing: Box<dyn PricingPolicy>,
        config: MeterConfig,
    ) -> Self {
        info!(
            chain = %backend.family(),
            treasury = %backend.treasury(),
            pricing = pricing.name(),
            serialize_per_requester = config.serialize_per_requester,
            "compute meter ready"
        );
        Self {
            backend,
            pricing,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &dyn ChainBackend {
        self.backend.as_ref()
    }

    pub fn pricing(&self) -> &dyn PricingPolicy {
        self.pricing.as_ref()
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Price `units` without touching the ledger
    pub fn quote(&self, units: ComputeUnits) -> GateResult<TokenAmount> {
        price_request(self.pricing.as_ref(), units)
    }

    /// Decide whether `requester` may run `units` of compute.
    ///
    /// `Admitted` is returned only after the backend confirmed the charge.
    /// A balance below the price is `Denied` without any charge; a charge
    /// that fails or cannot be confirmed is `ChargeFailed`.
    pub async fn authorize(
        &self,
        requester: &Identity,
        units: ComputeUnits,
    ) -> GateResult<Authorization> {
        let required = self.quote(units)?;
        self.backend
            .validate_identity(requester)
            .map_err(|e| invalid_identity(requester, e))?;

        let lease = self.lease(requester);
        let _turn = match &lease {
            Some(lease) => lease.lock().await,
            None => None,
        };
        self.settle(requester, units, required).await
    }

    async fn settle(
        &self,
        requester: &Identity,
        units: ComputeUnits,
        required: TokenAmount,
    ) -> GateResult<Authorization> {
        let balance = self
            .read_balance(requester)
            .await
            .map_err(|cause| {
                warn!(%requester, code = cause.error_code(), error = %cause, "balance unavailable");
                GateError::MeteringUnavailable { cause }
            })?;

        if balance < required {
            let shortfall = balance.shortfall_against(required);
            info!(%requester, %units, %required, %balance, %shortfall, "compute request denied");
            return Ok(Authorization::Denied {
                required,
                balance,
                shortfall,
            });
        }

        debug!(%requester, %units, %required, %balance, "charging");

        let charged = match timeout(self.config.charge_timeout, self.backend.charge(requester, required)).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::confirmation(
                None,
                format!("charge still pending after {:?}", self.config.charge_timeout),
            )),
        };

        match charged {
            Ok(receipt) => {
                info!(
                    %requester,
                    %units,
                    amount = %receipt.amount,
                    tx = %receipt.transaction_id,
                    "compute request admitted"
                );
                Ok(Authorization::Admitted { receipt })
            }
            Err(error) => {
                warn!(
                    %requester,
                    %required,
                    code = error.error_code(),
                    tx = error.transaction_id().unwrap_or("-"),
                    error = %error,
                    "charge failed"
                );
                Ok(Authorization::ChargeFailed { required, error })
            }
        }
    }

    /// Balance read bounded by `balance_timeout`, retrying connectivity
    /// failures with exponential backoff
    async fn read_balance(&self, requester: &Identity) -> Result<TokenAmount, ChainError> {
        let retry = &self.config.balance_retry;
        let mut retries = 0;

        loop {
            let result = match timeout(self.config.balance_timeout, self.backend.get_balance(requester)).await {
                Ok(result) => result,
                Err(_) => Err(ChainError::connectivity(format!(
                    "balance read exceeded {:?}",
                    self.config.balance_timeout
                ))),
            };

            match result {
                Err(e) if e.kind() == ChainErrorKind::Connectivity && retries < retry.max_retries => {
                    retries += 1;
                    let delay = retry.backoff(retries);
                    warn!(
                        %requester,
                        attempt = retries,
                        max = retry.max_retries,
                        error = %e,
                        "balance read failed, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn lease(&self, requester: &Identity) -> Option<LockLease<'_>> {
        if !self.config.serialize_per_requester {
            return None;
        }
        let lock = self
            .locks
            .entry(requester.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Some(LockLease {
            locks: &self.locks,
            requester: requester.clone(),
            lock: Some(lock),
        })
    }
}

/// A requester's slot in the lock table. Dropping the last lease removes
/// the entry, also when `authorize` is cancelled mid-flight.
struct LockLease<'a> {
    locks: &'a DashMap<Identity, Arc<Mutex<()>>>,
    requester: Identity,
    lock: Option<Arc<Mutex<()>>>,
}

impl LockLease<'_> {
    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.locks
            .remove_if(&self.requester, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Price a request the way `authorize` does: zero units, overflow and a
/// zero price are all `InvalidRequest`
pub fn price_request(pricing: &dyn PricingPolicy, units: ComputeUnits) -> GateResult<TokenAmount> {
    if units.is_zero() {
        return Err(GateError::invalid_request("at least one compute unit is required"));
    }
    let required = pricing.price(units).map_err(|e| match e {
        PricingError::Overflow { .. } => GateError::invalid_request(e.to_string()),
        PricingError::InvalidConfig(reason) => {
            GateError::invalid_request(format!("pricing unavailable: {reason}"))
        }
    })?;
    if required.is_zero() {
        return Err(GateError::invalid_request(format!(
            "{} priced {units} units at zero",
            pricing.name()
        )));
    }
    Ok(required)
}

fn invalid_identity(requester: &Identity, err: ChainError) -> GateError {
    match err {
        ChainError::InvalidIdentity { identity, reason } => {
            GateError::InvalidIdentity { identity, reason }
        }
        other => GateError::InvalidIdentity {
            identity: requester.to_string(),
            reason: other.to_string(),
        },
    }
}

impl std::fmt::Debug for ComputeMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeMeter")
            .field("chain", &self.backend.family())
            .field("treasury", self.backend.treasury())
            .field("pricing", &self.pricing)
            .field("config", &self.config)
            .finish()
    }
}
