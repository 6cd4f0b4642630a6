//! Settlement receipts
//!
//! A receipt is produced only for a charge the ledger confirmed. Failed or
//! ambiguous charges are reported as [`crate::ChainError`] instead.

use crate::{ChainFamily, Identity, TokenAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confirmed outcome of a charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Chain-native transaction identifier (signature or tx hash)
    pub transaction_id: String,
    /// Ledger family that settled the charge
    pub chain: ChainFamily,
    /// Who paid
    pub holder: Identity,
    /// Who received (the backend's treasury)
    pub payee: Identity,
    /// Amount moved, in smallest units
    pub amount: TokenAmount,
    /// Slot or block number the transfer landed in, when the ledger reports it
    pub slot: Option<u64>,
    /// When the confirmation was observed
    pub confirmed_at: DateTime<Utc>,
}

impl SettlementReceipt {
    /// Build a receipt stamped with the current time
    pub fn confirmed(
        transaction_id: impl Into<String>,
        chain: ChainFamily,
        holder: Identity,
        payee: Identity,
        amount: TokenAmount,
        slot: Option<u64>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            chain,
            holder,
            payee,
            amount,
            slot,
            confirmed_at: Utc::now(),
        }
    }
}
