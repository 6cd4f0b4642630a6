//! ERC-20 call encoding and revert decoding

use computegate_types::TokenAmount;
use thiserror::Error;

use crate::address::Address;

/// `balanceOf(address)`
pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// `transferFrom(address,address,uint256)`
pub const TRANSFER_FROM: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];
/// `Error(string)`
pub const ERROR_STRING: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `ERC20InsufficientBalance(address,uint256,uint256)`
pub const ERC20_INSUFFICIENT_BALANCE: [u8; 4] = [0xe4, 0x50, 0xd3, 0x8c];
/// `ERC20InsufficientAllowance(address,uint256,uint256)`
pub const ERC20_INSUFFICIENT_ALLOWANCE: [u8; 4] = [0xfb, 0x8f, 0x41, 0xb2];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("return data is not hex")]
    Hex,

    #[error("expected a 32-byte word, got {0} bytes")]
    WordLength(usize),

    #[error("value does not fit in 128 bits")]
    Overflow,
}

fn push_address(out: &mut Vec<u8>, address: &Address) {
    out.extend_from_slice(&[0u8; 12]);
    out.extend_from_slice(address.as_bytes());
}

fn push_uint(out: &mut Vec<u8>, value: u128) {
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn balance_of(holder: &Address) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF);
    push_address(&mut data, holder);
    data
}

pub fn transfer_from(from: &Address, to: &Address, amount: TokenAmount) -> Vec<u8> {
    let mut data = Vec::with_capacity(100);
    data.extend_from_slice(&TRANSFER_FROM);
    push_address(&mut data, from);
    push_address(&mut data, to);
    push_uint(&mut data, amount.base_units());
    data
}

/// Decode a single `uint256` return value from `0x`-prefixed hex
pub fn decode_uint(hex_data: &str) -> Result<TokenAmount, AbiError> {
    let raw = decode_hex(hex_data)?;
    if raw.len() != 32 {
        return Err(AbiError::WordLength(raw.len()));
    }
    if raw[..16].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&raw[16..]);
    Ok(TokenAmount::new(u128::from_be_bytes(low)))
}

pub fn decode_hex(hex_data: &str) -> Result<Vec<u8>, AbiError> {
    let digits = hex_data.strip_prefix("0x").unwrap_or(hex_data);
    hex::decode(digits).map_err(|_| AbiError::Hex)
}

/// Why a simulated call reverted, as far as the revert data tells
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revert {
    InsufficientBalance,
    InsufficientAllowance,
    Reason(String),
    Opaque,
}

impl Revert {
    pub fn from_data(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Revert::Opaque;
        }
        let (selector, body) = data.split_at(4);
        if selector == ERC20_INSUFFICIENT_BALANCE {
            Revert::InsufficientBalance
        } else if selector == ERC20_INSUFFICIENT_ALLOWANCE {
            Revert::InsufficientAllowance
        } else if selector == ERROR_STRING {
            decode_string(body).map_or(Revert::Opaque, Revert::Reason)
        } else {
            Revert::Opaque
        }
    }

    /// Whether the revert blames the holder's balance
    pub fn is_balance(&self) -> bool {
        match self {
            Revert::InsufficientBalance => true,
            Revert::Reason(reason) => mentions_balance(reason),
            _ => false,
        }
    }
}

/// Revert strings from pre-custom-error tokens, e.g.
/// "ERC20: transfer amount exceeds balance"
pub fn mentions_balance(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("balance") && !text.contains("allowance")
}

fn decode_string(body: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<usize> {
        let chunk = body.get(i..i + 32)?;
        if chunk[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&chunk[24..]);
        usize::try_from(u64::from_be_bytes(low)).ok()
    };
    let offset = word(0)?;
    let len = word(offset)?;
    let start = offset.checked_add(32)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_string(reason: &str) -> Vec<u8> {
        let mut data = ERROR_STRING.to_vec();
        push_uint(&mut data, 32);
        push_uint(&mut data, reason.len() as u128);
        let mut padded = reason.as_bytes().to_vec();
        padded.resize(reason.len().div_ceil(32) * 32, 0);
        data.extend(padded);
        data
    }

    #[test]
    fn test_call_layouts() {
        let holder = Address::new([0xaa; 20]);
        let treasury = Address::new([0xbb; 20]);

        let call = balance_of(&holder);
        assert_eq!(hex::encode(&call[..4]), "70a08231");
        assert_eq!(call.len(), 36);
        assert_eq!(&call[16..], holder.as_bytes());

        let call = transfer_from(&holder, &treasury, TokenAmount::new(3_000_000));
        assert_eq!(hex::encode(&call[..4]), "23b872dd");
        assert_eq!(call.len(), 100);
        assert_eq!(&call[16..36], holder.as_bytes());
        assert_eq!(&call[48..68], treasury.as_bytes());
        assert_eq!(&call[84..], &3_000_000u128.to_be_bytes());
    }

    #[test]
    fn test_decode_uint() {
        let word = format!("0x{:064x}", 5_000_000u64);
        assert_eq!(decode_uint(&word).unwrap(), TokenAmount::new(5_000_000));
        assert_eq!(decode_uint("0x"), Err(AbiError::WordLength(0)));
        let huge = format!("0x01{}", "00".repeat(31));
        assert_eq!(decode_uint(&huge), Err(AbiError::Overflow));
    }

    #[test]
    fn test_revert_classification() {
        let mut custom = ERC20_INSUFFICIENT_BALANCE.to_vec();
        custom.extend([0u8; 96]);
        assert!(Revert::from_data(&custom).is_balance());

        let mut allowance = ERC20_INSUFFICIENT_ALLOWANCE.to_vec();
        allowance.extend([0u8; 96]);
        assert_eq!(Revert::from_data(&allowance), Revert::InsufficientAllowance);
        assert!(!Revert::from_data(&allowance).is_balance());

        let reason = Revert::from_data(&error_string("ERC20: transfer amount exceeds balance"));
        assert_eq!(
            reason,
            Revert::Reason("ERC20: transfer amount exceeds balance".into())
        );
        assert!(reason.is_balance());

        assert!(!Revert::from_data(&error_string("ERC20: insufficient allowance")).is_balance());
        assert_eq!(Revert::from_data(&[]), Revert::Opaque);
    }
}
