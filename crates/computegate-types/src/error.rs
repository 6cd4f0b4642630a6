//! Error types for the compute gate
//!
//! Every failure is explicit and carries a machine-checkable kind next to
//! its human-readable cause, so callers can branch on the kind without
//! string matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Amount Errors
// ============================================================================

/// Result type for amount arithmetic
pub type AmountResult<T> = std::result::Result<T, AmountError>;

/// Amount arithmetic and parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Amount overflow during arithmetic operation")]
    Overflow,

    #[error("Amount underflow: {minuend} - {subtrahend} would be negative")]
    Underflow { minuend: u128, subtrahend: u128 },

    #[error("Amount {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("Invalid amount literal: {input:?}")]
    Parse { input: String },
}

// ============================================================================
// Chain Backend Errors
// ============================================================================

/// Result type for chain backend operations
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainErrorKind {
    /// Address malformed or not resolvable on this chain
    InvalidIdentity,
    /// Ledger endpoint unreachable or timed out
    Connectivity,
    /// Ledger rejected the transfer for balance reasons
    InsufficientFunds,
    /// Transaction was not constructed, signed or accepted; nothing applied
    Submission,
    /// Transaction was sent but its outcome was not observed in time
    Confirmation,
    /// Anything else the backend could not classify
    Unknown,
}

impl fmt::Display for ChainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainErrorKind::InvalidIdentity => "invalid_identity",
            ChainErrorKind::Connectivity => "connectivity",
            ChainErrorKind::InsufficientFunds => "insufficient_funds",
            ChainErrorKind::Submission => "submission",
            ChainErrorKind::Confirmation => "confirmation",
            ChainErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Backend failure with its underlying cause preserved as text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Invalid identity {identity:?}: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    #[error("Ledger unreachable: {cause}")]
    Connectivity { cause: String },

    #[error("Insufficient funds: {cause}")]
    InsufficientFunds { cause: String },

    #[error("Charge not submitted: {cause}")]
    Submission { cause: String },

    #[error("Charge outcome unknown (tx {}): {cause}", .transaction_id.as_deref().unwrap_or("unsent"))]
    Confirmation {
        transaction_id: Option<String>,
        cause: String,
    },

    #[error("Backend error: {cause}")]
    Unknown { cause: String },
}

impl ChainError {
    pub fn invalid_identity(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    pub fn connectivity(cause: impl fmt::Display) -> Self {
        Self::Connectivity {
            cause: cause.to_string(),
        }
    }

    pub fn insufficient_funds(cause: impl fmt::Display) -> Self {
        Self::InsufficientFunds {
            cause: cause.to_string(),
        }
    }

    pub fn submission(cause: impl fmt::Display) -> Self {
        Self::Submission {
            cause: cause.to_string(),
        }
    }

    pub fn confirmation(transaction_id: Option<String>, cause: impl fmt::Display) -> Self {
        Self::Confirmation {
            transaction_id,
            cause: cause.to_string(),
        }
    }

    pub fn unknown(cause: impl fmt::Display) -> Self {
        Self::Unknown {
            cause: cause.to_string(),
        }
    }

    /// The failure kind, for branching without string matching
    pub fn kind(&self) -> ChainErrorKind {
        match self {
            Self::InvalidIdentity { .. } => ChainErrorKind::InvalidIdentity,
            Self::Connectivity { .. } => ChainErrorKind::Connectivity,
            Self::InsufficientFunds { .. } => ChainErrorKind::InsufficientFunds,
            Self::Submission { .. } => ChainErrorKind::Submission,
            Self::Confirmation { .. } => ChainErrorKind::Confirmation,
            Self::Unknown { .. } => ChainErrorKind::Unknown,
        }
    }

    /// Whether the failed operation may be retried as-is
    ///
    /// `Confirmation` is deliberately excluded: the original transfer may
    /// have landed, so the balance must be re-read before any retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Submission { .. })
    }

    /// Transaction id attached to an ambiguous charge, if one was computed
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::Confirmation { transaction_id, .. } => transaction_id.as_deref(),
            _ => None,
        }
    }

    /// Get an error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIdentity { .. } => "INVALID_IDENTITY",
            Self::Connectivity { .. } => "LEDGER_UNREACHABLE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::Submission { .. } => "SUBMISSION_FAILED",
            Self::Confirmation { .. } => "CONFIRMATION_UNKNOWN",
            Self::Unknown { .. } => "BACKEND_ERROR",
        }
    }
}

// ============================================================================
// Gate Errors
// ============================================================================

/// Result type for gate operations
pub type GateResult<T> = std::result::Result<T, GateError>;

/// Failures that prevent the gate from reaching a decision
///
/// Denials and failed charges are *decisions* and are reported through the
/// gate's authorization outcome, not through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Invalid requester {identity:?}: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    #[error("Metering unavailable: {cause}")]
    MeteringUnavailable { cause: ChainError },
}

impl GateError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::MeteringUnavailable { cause } => cause.is_retriable(),
            _ => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::InvalidIdentity { .. } => "INVALID_IDENTITY",
            Self::MeteringUnavailable { .. } => "METERING_UNAVAILABLE",
        }
    }
}
