//! In-process ledger backend
//!
//! A faithful stand-in for a real chain: balances live behind one lock and
//! `charge` checks and debits atomically, so a second charge against
//! exhausted funds fails with `InsufficientFunds` exactly like on-chain
//! settlement. Faults can be injected to exercise every failure kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::ChainBackend;
use computegate_types::{
    ChainError, ChainFamily, ChainResult, Identity, SettlementReceipt, TokenAmount,
};

/// Injected behaviour for the next charges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeFault {
    /// Fail without moving funds
    Reject(ChainError),
    /// Move funds, then report the outcome as unknown
    SettleThenLoseConfirmation,
}

#[derive(Default)]
struct Faults {
    balance: Option<ChainError>,
    charge: Option<ChargeFault>,
    latency: Option<Duration>,
}

struct LedgerState {
    balances: RwLock<HashMap<Identity, TokenAmount>>,
    faults: RwLock<Faults>,
    treasury: Identity,
    balance_calls: AtomicUsize,
    charge_calls: AtomicUsize,
    tx_counter: AtomicU64,
}

/// Shared in-memory ledger; clones observe the same state
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(treasury: impl Into<Identity>) -> Self {
        Self {
            state: Arc::new(LedgerState {
                balances: RwLock::new(HashMap::new()),
                faults: RwLock::new(Faults::default()),
                treasury: treasury.into(),
                balance_calls: AtomicUsize::new(0),
                charge_calls: AtomicUsize::new(0),
                tx_counter: AtomicU64::new(0),
            }),
        }
    }

    pub async fn set_balance(&self, holder: impl Into<Identity>, amount: TokenAmount) {
        self.state
            .balances
            .write()
            .await
            .insert(holder.into(), amount);
    }

    /// Current balance without counting as a backend call
    pub async fn balance_of(&self, holder: &Identity) -> TokenAmount {
        self.state
            .balances
            .read()
            .await
            .get(holder)
            .copied()
            .unwrap_or(TokenAmount::ZERO)
    }

    /// Make every balance read fail with `error` until cleared
    pub async fn fail_balance_with(&self, error: Option<ChainError>) {
        self.state.faults.write().await.balance = error;
    }

    /// Apply `fault` to every charge until cleared
    pub async fn fault_charges(&self, fault: Option<ChargeFault>) {
        self.state.faults.write().await.charge = fault;
    }

    /// Delay every balance read and charge by `latency`
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.faults.write().await.latency = latency;
    }

    pub fn balance_calls(&self) -> usize {
        self.state.balance_calls.load(Ordering::SeqCst)
    }

    pub fn charge_calls(&self) -> usize {
        self.state.charge_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let latency = self.state.faults.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn settle(&self, holder: &Identity, amount: TokenAmount) -> ChainResult<u64> {
        let mut balances = self.state.balances.write().await;

        let available = balances.get(holder).copied().unwrap_or(TokenAmount::ZERO);
        let remaining = available.checked_sub(amount).map_err(|_| {
            ChainError::insufficient_funds(format!(
                "{holder} holds {available}, transfer needs {amount}"
            ))
        })?;
        let seq = self.state.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if holder == &self.state.treasury {
            return Ok(seq);
        }

        let credited = balances
            .get(&self.state.treasury)
            .copied()
            .unwrap_or(TokenAmount::ZERO)
            .checked_add(amount)
            .map_err(ChainError::unknown)?;

        balances.insert(holder.clone(), remaining);
        balances.insert(self.state.treasury.clone(), credited);

        Ok(seq)
    }
}

#[async_trait]
impl ChainBackend for InMemoryLedger {
    fn family(&self) -> ChainFamily {
        ChainFamily::Memory
    }

    fn treasury(&self) -> &Identity {
        &self.state.treasury
    }

    fn validate_identity(&self, holder: &Identity) -> ChainResult<()> {
        if holder.is_empty() {
            return Err(ChainError::invalid_identity(holder.as_str(), "empty address"));
        }
        if holder.as_str().chars().any(char::is_whitespace) {
            return Err(ChainError::invalid_identity(
                holder.as_str(),
                "address contains whitespace",
            ));
        }
        Ok(())
    }

    async fn get_balance(&self, holder: &Identity) -> ChainResult<TokenAmount> {
        self.validate_identity(holder)?;
        self.state.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(err) = self.state.faults.read().await.balance.clone() {
            return Err(err);
        }
        Ok(self.balance_of(holder).await)
    }

    async fn charge(
        &self,
        holder: &Identity,
        amount: TokenAmount,
    ) -> ChainResult<SettlementReceipt> {
        self.validate_identity(holder)?;
        self.state.charge_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let fault = self.state.faults.read().await.charge.clone();
        match fault {
            Some(ChargeFault::Reject(err)) => {
                warn!(%holder, %amount, code = err.error_code(), "injected charge failure");
                Err(err)
            }
            Some(ChargeFault::SettleThenLoseConfirmation) => {
                let seq = self.settle(holder, amount).await?;
                warn!(%holder, %amount, "charge settled but confirmation withheld");
                Err(ChainError::confirmation(
                    Some(format!("mem-{seq}")),
                    "confirmation wait elapsed",
                ))
            }
            None => {
                let seq = self.settle(holder, amount).await?;
                info!(%holder, %amount, seq, "in-memory charge settled");
                Ok(SettlementReceipt::confirmed(
                    format!("mem-{seq}"),
                    ChainFamily::Memory,
                    holder.clone(),
                    self.state.treasury.clone(),
                    amount,
                    Some(seq),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use computegate_types::ChainErrorKind;

    fn alice() -> Identity {
        Identity::new("alice")
    }

    #[tokio::test]
    async fn test_charge_moves_funds_to_treasury() {
        let ledger = InMemoryLedger::new("treasury");
        ledger.set_balance("alice", TokenAmount::new(10)).await;

        let receipt = ledger.charge(&alice(), TokenAmount::new(4)).await.unwrap();
        assert_eq!(receipt.amount, TokenAmount::new(4));
        assert_eq!(receipt.payee, Identity::new("treasury"));
        assert_eq!(ledger.balance_of(&alice()).await, TokenAmount::new(6));
        assert_eq!(
            ledger.balance_of(&Identity::new("treasury")).await,
            TokenAmount::new(4)
        );
    }

    #[tokio::test]
    async fn test_overdraw_is_rejected_atomically() {
        let ledger = InMemoryLedger::new("treasury");
        ledger.set_balance("alice", TokenAmount::new(3)).await;

        let err = ledger.charge(&alice(), TokenAmount::new(4)).await.unwrap_err();
        assert_eq!(err.kind(), ChainErrorKind::InsufficientFunds);
        assert_eq!(ledger.balance_of(&alice()).await, TokenAmount::new(3));
    }

    #[tokio::test]
    async fn test_invalid_identity_is_rejected_before_counting() {
        let ledger = InMemoryLedger::new("treasury");
        let err = ledger.get_balance(&Identity::new("a b")).await.unwrap_err();
        assert_eq!(err.kind(), ChainErrorKind::InvalidIdentity);
        assert_eq!(ledger.balance_calls(), 0);
    }

    #[tokio::test]
    async fn test_settle_then_lose_confirmation_moves_funds() {
        let ledger = InMemoryLedger::new("treasury");
        ledger.set_balance("alice", TokenAmount::new(10)).await;
        ledger
            .fault_charges(Some(ChargeFault::SettleThenLoseConfirmation))
            .await;

        let err = ledger.charge(&alice(), TokenAmount::new(10)).await.unwrap_err();
        assert_eq!(err.kind(), ChainErrorKind::Confirmation);
        assert_eq!(err.transaction_id(), Some("mem-1"));
        assert_eq!(ledger.balance_of(&alice()).await, TokenAmount::ZERO);
    }
}
