//! Compute Gate EVM - ERC-20 backend
//!
//! Holders are plain 20-byte accounts; the token contract tracks balances
//! directly. The backend key is each holder's approved spender: a charge is
//! `transferFrom(holder, treasury, amount)` sent as a legacy EIP-155
//! transaction after an `eth_call` simulation, then confirmed by polling for
//! its receipt.

pub mod abi;
pub mod address;
pub mod backend;
pub mod rlp;
pub mod transaction;

pub use address::{Address, AddressError};
pub use backend::{
    signing_key_from_credential, BlockTag, EvmBackend, EvmConfig, EvmError, DEFAULT_GAS_LIMIT,
};
pub use transaction::{LegacyTransaction, SignedTransaction};

use sha3::{Digest, Keccak256};

/// Keccak-256 as used throughout Ethereum (not NIST SHA3-256)
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(input);
    hasher.finalize().into()
}
