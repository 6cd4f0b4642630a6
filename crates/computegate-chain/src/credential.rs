//! Signing credential holder
//!
//! Secret key bytes travel from configuration into exactly one backend
//! constructor inside a [`SigningCredential`]. The type is not `Clone`, not
//! serializable, prints as `[REDACTED]`, and zeroes its buffer on drop.

use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential is empty")]
    Empty,

    #[error("credential must be {expected}, got {actual} bytes")]
    BadLength { expected: &'static str, actual: usize },

    #[error("credential is not valid {encoding}")]
    Encoding { encoding: &'static str },

    #[error("credential rejected: {0}")]
    Invalid(String),
}

/// Secret key material owned by a single backend
pub struct SigningCredential {
    bytes: Zeroizing<Vec<u8>>,
}

impl SigningCredential {
    /// Take ownership of raw secret bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CredentialError> {
        if bytes.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self {
            bytes: Zeroizing::new(bytes),
        })
    }

    /// Parse a hex string, with or without `0x`
    pub fn from_hex(input: &str) -> Result<Self, CredentialError> {
        let input = Zeroizing::new(input.trim().to_string());
        let raw = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input.as_str());
        let bytes = hex::decode(raw).map_err(|_| CredentialError::Encoding { encoding: "hex" })?;
        Self::from_bytes(bytes)
    }

    /// Parse a JSON byte array, the format of Solana keypair files
    pub fn from_json_array(input: &str) -> Result<Self, CredentialError> {
        let bytes: Vec<u8> = serde_json::from_str(input.trim())
            .map_err(|_| CredentialError::Encoding { encoding: "JSON byte array" })?;
        Self::from_bytes(bytes)
    }

    /// Parse either a JSON byte array or a hex string
    pub fn parse(input: &str) -> Result<Self, CredentialError> {
        if input.trim_start().starts_with('[') {
            Self::from_json_array(input)
        } else {
            Self::from_hex(input)
        }
    }

    /// Borrow the secret bytes.
    ///
    /// Only backend constructors call this, to derive their typed signing key.
    pub fn expose_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("bytes", &"[REDACTED]")
            .field("len", &self.bytes.len())
            .finish()
    }
}
