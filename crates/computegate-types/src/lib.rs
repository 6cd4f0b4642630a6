//! Compute Gate Types - Canonical domain types for token-metered compute
//!
//! This crate contains all foundational types for the compute gate with zero
//! dependencies on other computegate crates. It defines:
//!
//! - Chain-native identities and ledger families
//! - Token amounts in smallest indivisible units (never floating point)
//! - Compute unit counts
//! - Settlement receipts
//! - The backend and gate error taxonomy
//!
//! # Gate Invariants
//!
//! 1. Compute is admitted only after the ledger confirms the charge
//! 2. "Could not check" is never conflated with "insufficient funds"
//! 3. An ambiguous settlement always resolves to denial of new work
//! 4. Amounts are never negative and never silently clamped

pub mod identity;
pub mod amount;
pub mod receipt;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use receipt::*;
pub use error::*;

/// Version of the compute gate types schema
pub const TYPES_VERSION: &str = "0.1.0";
