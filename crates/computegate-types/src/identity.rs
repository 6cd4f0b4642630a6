//! Identity types for the compute gate
//!
//! An [`Identity`] is an opaque, chain-native address. This crate does not
//! know how to validate it; each backend checks its own address format
//! before touching the network.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain-native address of a token holder (or of a treasury)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an address string as-is
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the raw address
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw address
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Check for the empty address (never valid on any chain)
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ledger family a backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// Token-account model (balances live in derived per-holder accounts)
    Solana,
    /// Account model (balances live on the address, ERC-20 contracts)
    Evm,
    /// Local in-process ledger used for tests and dry runs
    Memory,
}

impl ChainFamily {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Solana => "solana",
            ChainFamily::Evm => "evm",
            ChainFamily::Memory => "memory",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_transparent_in_json() {
        let id = Identity::new("0xabc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0xabc\"");
    }

    #[test]
    fn test_blank_identity_is_empty() {
        assert!(Identity::new("   ").is_empty());
        assert!(!Identity::new("x").is_empty());
    }

    #[test]
    fn test_chain_family_names() {
        assert_eq!(ChainFamily::Solana.to_string(), "solana");
        assert_eq!(
            serde_json::to_string(&ChainFamily::Evm).unwrap(),
            "\"evm\""
        );
    }
}
