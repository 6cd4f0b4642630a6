//! Legacy (type 0) transactions with EIP-155 replay protection

use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::address::Address;
use crate::keccak256;
use crate::rlp;

#[derive(Debug, Error)]
#[error("signing failed: {0}")]
pub struct SigningError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// Raw signed transaction and its hash
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: [u8; 32],
}

impl SignedTransaction {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

impl LegacyTransaction {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        rlp::encode_uint(out, self.nonce.into());
        rlp::encode_uint(out, self.gas_price);
        rlp::encode_uint(out, self.gas_limit.into());
        rlp::encode_bytes(out, self.to.as_bytes());
        rlp::encode_uint(out, self.value);
        rlp::encode_bytes(out, &self.data);
    }

    /// RLP payload whose keccak256 is signed:
    /// `[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]`
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = Vec::with_capacity(64 + self.data.len());
        self.encode_fields(&mut fields);
        rlp::encode_uint(&mut fields, self.chain_id.into());
        rlp::encode_uint(&mut fields, 0);
        rlp::encode_uint(&mut fields, 0);
        rlp::encode_list(&fields)
    }

    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, SigningError> {
        let digest = Keccak256::new_with_prefix(self.signing_payload());
        let (signature, recovery): (Signature, RecoveryId) = key
            .sign_digest_recoverable(digest)
            .map_err(|e| SigningError(e.to_string()))?;

        let v = u128::from(recovery.to_byte()) + 35 + 2 * u128::from(self.chain_id);
        let (r, s) = signature.split_bytes();

        let mut fields = Vec::with_capacity(140 + self.data.len());
        self.encode_fields(&mut fields);
        rlp::encode_uint(&mut fields, v);
        rlp::encode_scalar(&mut fields, &r);
        rlp::encode_scalar(&mut fields, &s);

        let raw = rlp::encode_list(&fields);
        let hash = keccak256(&raw);
        Ok(SignedTransaction { raw, hash })
    }
}
