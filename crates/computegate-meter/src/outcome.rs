//! Decisions returned by the meter

use computegate_types::{ChainError, SettlementReceipt, TokenAmount};
use std::fmt;

/// Outcome of one `authorize` call that reached a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The charge settled; the caller may run the work
    Admitted { receipt: SettlementReceipt },

    /// The confirmed balance does not cover the price; nothing was charged
    Denied {
        required: TokenAmount,
        balance: TokenAmount,
        shortfall: TokenAmount,
    },

    /// The charge was attempted and did not settle visibly.
    ///
    /// With a `Confirmation` error the transfer may still land; re-read the
    /// balance before trying again.
    ChargeFailed {
        required: TokenAmount,
        error: ChainError,
    },
}

impl Authorization {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Authorization::Admitted { .. })
    }

    pub fn receipt(&self) -> Option<&SettlementReceipt> {
        match self {
            Authorization::Admitted { receipt } => Some(receipt),
            _ => None,
        }
    }

    /// Amount the request was priced at
    pub fn required(&self) -> TokenAmount {
        match self {
            Authorization::Admitted { receipt } => receipt.amount,
            Authorization::Denied { required, .. } | Authorization::ChargeFailed { required, .. } => {
                *required
            }
        }
    }

    pub fn decision(&self) -> &'static str {
        match self {
            Authorization::Admitted { .. } => "admitted",
            Authorization::Denied { .. } => "denied",
            Authorization::ChargeFailed { .. } => "charge_failed",
        }
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authorization::Admitted { receipt } => write!(
                f,
                "admitted: charged {} in {}",
                receipt.amount, receipt.transaction_id
            ),
            Authorization::Denied {
                required,
                balance,
                shortfall,
            } => write!(
                f,
                "denied: requires {required}, balance {balance}, short by {shortfall}"
            ),
            Authorization::ChargeFailed { required, error } => {
                write!(f, "charge of {required} failed: {error}")
            }
        }
    }
}
