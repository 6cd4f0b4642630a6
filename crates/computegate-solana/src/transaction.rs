//! Legacy transaction encoding for a single SPL token transfer
//!
//! Wire layout:
//!
//! ```text
//! transaction = shortvec(signatures) ‖ message
//! message     = header[3] ‖ shortvec(account_keys) ‖ blockhash[32] ‖ shortvec(instructions)
//! instruction = program_index ‖ shortvec(account_indices) ‖ shortvec(data)
//! ```

use ed25519_dalek::{Signer, SigningKey};

use crate::pubkey::Pubkey;

/// SPL Token `Transfer` instruction discriminator
const TRANSFER_TAG: u8 = 3;

/// Append `len` as a compact-u16 ("shortvec") length prefix
pub fn encode_shortvec_len(out: &mut Vec<u8>, len: usize) {
    let mut rem = len;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// One `Transfer` from `source` to `destination`, authorized and paid for by
/// `authority` (the source owner or its approved delegate)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMessage {
    pub authority: Pubkey,
    pub source: Pubkey,
    pub destination: Pubkey,
    pub token_program: Pubkey,
    pub amount: u64,
    pub recent_blockhash: [u8; 32],
}

impl TransferMessage {
    /// Serialized message bytes, the payload that gets signed
    pub fn serialize(&self) -> Vec<u8> {
        // keys: 0 authority (signer, writable, fee payer), 1 source (w),
        // 2 destination (w), 3 token program (readonly)
        let keys = [
            &self.authority,
            &self.source,
            &self.destination,
            &self.token_program,
        ];

        let mut out = Vec::with_capacity(3 + 1 + 32 * keys.len() + 32 + 32);
        out.extend_from_slice(&[1, 0, 1]);

        encode_shortvec_len(&mut out, keys.len());
        for key in keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);

        let mut data = Vec::with_capacity(9);
        data.push(TRANSFER_TAG);
        data.extend_from_slice(&self.amount.to_le_bytes());

        encode_shortvec_len(&mut out, 1);
        out.push(3);
        let accounts = [1u8, 2, 0];
        encode_shortvec_len(&mut out, accounts.len());
        out.extend_from_slice(&accounts);
        encode_shortvec_len(&mut out, data.len());
        out.extend_from_slice(&data);

        out
    }

    /// Sign with the single required signer and return the transaction bytes
    /// together with its signature (the transaction id)
    pub fn sign(&self, signer: &SigningKey) -> SignedTransaction {
        let message = self.serialize();
        let signature = signer.sign(&message).to_bytes();

        let mut wire = Vec::with_capacity(1 + 64 + message.len());
        encode_shortvec_len(&mut wire, 1);
        wire.extend_from_slice(&signature);
        wire.extend_from_slice(&message);

        SignedTransaction { signature, wire }
    }
}

/// A signed, serialized transaction
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub signature: [u8; 64],
    pub wire: Vec<u8>,
}

impl SignedTransaction {
    /// Base58 signature, the identifier RPC nodes report
    pub fn signature_b58(&self) -> String {
        bs58::encode(self.signature).into_string()
    }
}
