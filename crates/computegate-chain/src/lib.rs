//! Compute Gate Chain - ledger backends behind one contract
//!
//! A [`ChainBackend`] is the capability set the gate needs from a ledger:
//! read a holder's confirmed token balance, and move tokens from the holder
//! to the backend's treasury. Each ledger family implements it once; the
//! externally observable contract is identical across families:
//!
//! | Operation     | Failure kinds                                            |
//! |---------------|----------------------------------------------------------|
//! | `get_balance` | `InvalidIdentity`, `Connectivity`, `Unknown`             |
//! | `charge`      | `InvalidIdentity`, `InsufficientFunds`, `Submission`, `Confirmation` |
//!
//! A backend never re-checks the balance before charging; the ledger's own
//! settlement is the authoritative check.
//!
//! This crate also provides the shared JSON-RPC transport ([`rpc`]), the
//! signing credential holder ([`SigningCredential`]) and a faithful
//! in-process ledger ([`InMemoryLedger`]) for tests and dry runs.

pub mod credential;
pub mod memory;
pub mod rpc;

pub use credential::{CredentialError, SigningCredential};
pub use memory::{ChargeFault, InMemoryLedger};
pub use rpc::{RpcClient, RpcError};

pub use computegate_types::{
    ChainError, ChainErrorKind, ChainFamily, ChainResult, Identity, SettlementReceipt,
    TokenAmount,
};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single RPC request
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on waiting for a submitted transfer to confirm
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between confirmation polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ledger capability set used by the gate
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Ledger family this backend talks to
    fn family(&self) -> ChainFamily;

    /// Identity that receives charged tokens
    fn treasury(&self) -> &Identity;

    /// Check that `holder` is a well-formed address for this chain.
    ///
    /// Performs no I/O; called before any network round trip.
    fn validate_identity(&self, holder: &Identity) -> ChainResult<()>;

    /// Latest confirmed balance of the configured token held by `holder`
    async fn get_balance(&self, holder: &Identity) -> ChainResult<TokenAmount>;

    /// Move `amount` from `holder` to the treasury and wait for confirmation
    async fn charge(&self, holder: &Identity, amount: TokenAmount)
        -> ChainResult<SettlementReceipt>;
}

#[async_trait]
impl<B: ChainBackend + ?Sized> ChainBackend for Arc<B> {
    fn family(&self) -> ChainFamily {
        (**self).family()
    }

    fn treasury(&self) -> &Identity {
        (**self).treasury()
    }

    fn validate_identity(&self, holder: &Identity) -> ChainResult<()> {
        (**self).validate_identity(holder)
    }

    async fn get_balance(&self, holder: &Identity) -> ChainResult<TokenAmount> {
        (**self).get_balance(holder).await
    }

    async fn charge(
        &self,
        holder: &Identity,
        amount: TokenAmount,
    ) -> ChainResult<SettlementReceipt> {
        (**self).charge(holder, amount).await
    }
}

/// Timeouts shared by the network backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
    /// Bound on each RPC request
    pub rpc: Duration,
    /// Bound on waiting for a submitted transfer to confirm
    pub confirmation: Duration,
    /// Delay between confirmation polls
    pub poll_interval: Duration,
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self {
            rpc: DEFAULT_RPC_TIMEOUT,
            confirmation: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
