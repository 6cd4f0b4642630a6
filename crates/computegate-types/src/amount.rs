//! Token amounts and compute unit counts
//!
//! Amounts are unsigned integers in the token's smallest indivisible unit
//! (lamport-style base units on Solana, `10^-decimals` on ERC-20). Every
//! arithmetic operation is checked; an operation that would go negative is
//! an error, never a clamp.

use crate::{AmountError, AmountResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Non-negative token amount in smallest units
///
/// Backed by `u128`, which covers every SPL amount (`u64`) and any ERC-20
/// balance below `2^128`. Ledger values above that bound are reported by the
/// backend instead of being truncated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// The zero amount
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Create an amount from smallest units
    pub const fn new(base_units: u128) -> Self {
        Self(base_units)
    }

    /// Raw value in smallest units
    pub const fn base_units(&self) -> u128 {
        self.0
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> AmountResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Checked subtraction; going below zero is rejected
    pub fn checked_sub(self, other: Self) -> AmountResult<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(AmountError::Underflow {
                minuend: self.0,
                subtrahend: other.0,
            })
    }

    /// Checked multiplication by a scalar
    pub fn checked_mul(self, factor: u128) -> AmountResult<Self> {
        self.0
            .checked_mul(factor)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// How much `self` falls short of `required` (zero when it covers it)
    pub fn shortfall_against(self, required: Self) -> Self {
        Self(required.0.saturating_sub(self.0))
    }

    /// Fit into a `u64` (SPL token amounts)
    pub fn to_u64(self) -> AmountResult<u64> {
        u64::try_from(self.0).map_err(|_| AmountError::OutOfRange {
            value: self.0.to_string(),
            target: "u64",
        })
    }

    /// Render with a decimal point for humans, e.g. `3000000` at 6 decimals
    /// is `3.000000`. Integer-only formatting, no float rounding.
    pub fn to_display(&self, decimals: u8) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let Some(scale) = 10u128.checked_pow(decimals as u32) else {
            return self.0.to_string();
        };
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        format!("{}.{:0>width$}", whole, frac, width = decimals as usize)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(v: u64) -> Self {
        Self(v as u128)
    }
}

impl From<u128> for TokenAmount {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> AmountResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::Parse {
                input: s.to_string(),
            });
        }
        trimmed
            .parse::<u128>()
            .map(Self)
            .map_err(|_| AmountError::OutOfRange {
                value: trimmed.to_string(),
                target: "u128",
            })
    }
}

// Amounts travel as decimal strings so JSON consumers never see a float.
impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Int(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Int(v) => Ok(Self::from(v)),
        }
    }
}

/// Count of billable work units requested by a caller
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ComputeUnits(pub u64);

impl ComputeUnits {
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ComputeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ComputeUnits {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
