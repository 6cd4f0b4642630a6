//! Solana public keys and program-derived addresses

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SPL Token program
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// SPL Token-2022 program
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Associated Token Account program
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const MAX_SEED_LEN: usize = 32;
const MAX_SEEDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubkeyError {
    #[error("not valid base58")]
    Base58,

    #[error("expected 32 bytes, decoded {0}")]
    Length(usize),
}

/// 32-byte ed25519 public key or program-derived address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the bytes decompress to a point on the ed25519 curve.
    /// Program-derived addresses must not.
    pub fn is_on_curve(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }

    /// Hash seeds into an address owned by `program_id`; `None` when the
    /// candidate lands on the curve or the seeds are out of bounds
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<Pubkey> {
        if seeds.len() > MAX_SEEDS || seeds.iter().any(|s| s.len() > MAX_SEED_LEN) {
            return None;
        }
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());
        (!candidate.is_on_curve()).then_some(candidate)
    }

    /// First off-curve address found searching the bump seed from 255 down
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
        for bump in (0..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            if let Some(address) = Self::create_program_address(&with_bump, program_id) {
                return Some((address, bump));
            }
        }
        None
    }
}

/// Associated token account of `owner` for `mint` under `token_program`
pub fn associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
    associated_program: &Pubkey,
) -> Option<Pubkey> {
    Pubkey::find_program_address(
        &[owner.as_bytes(), token_program.as_bytes(), mint.as_bytes()],
        associated_program,
    )
    .map(|(address, _)| address)
}

impl FromStr for Pubkey {
    type Err = PubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|_| PubkeyError::Base58)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PubkeyError::Length(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl From<VerifyingKey> for Pubkey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn wallet(seed: u8) -> Pubkey {
        SigningKey::from_bytes(&[seed; 32]).verifying_key().into()
    }

    #[test]
    fn test_system_program_is_all_zero() {
        let system: Pubkey = "11111111111111111111111111111111".parse().unwrap();
        assert_eq!(system.as_bytes(), &[0u8; 32]);
        assert_eq!(system.to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn test_program_ids_parse() {
        for id in [TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, ASSOCIATED_TOKEN_PROGRAM_ID] {
            let key: Pubkey = id.parse().unwrap();
            assert_eq!(key.to_string(), id);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!("0OIl".parse::<Pubkey>(), Err(PubkeyError::Base58));
        assert!(matches!("abc".parse::<Pubkey>(), Err(PubkeyError::Length(_))));
    }

    #[test]
    fn test_wallet_keys_are_on_curve() {
        assert!(wallet(1).is_on_curve());
    }

    #[test]
    fn test_associated_token_address_is_deterministic_and_off_curve() {
        let mint = wallet(2);
        let token: Pubkey = TOKEN_PROGRAM_ID.parse().unwrap();
        let ata_program: Pubkey = ASSOCIATED_TOKEN_PROGRAM_ID.parse().unwrap();

        let a = associated_token_address(&wallet(1), &mint, &token, &ata_program).unwrap();
        let b = associated_token_address(&wallet(1), &mint, &token, &ata_program).unwrap();
        let other = associated_token_address(&wallet(3), &mint, &token, &ata_program).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(!a.is_on_curve());
    }

    #[test]
    fn test_token_program_changes_the_account() {
        let owner = wallet(1);
        let mint = wallet(2);
        let ata_program: Pubkey = ASSOCIATED_TOKEN_PROGRAM_ID.parse().unwrap();
        let classic = associated_token_address(
            &owner,
            &mint,
            &TOKEN_PROGRAM_ID.parse().unwrap(),
            &ata_program,
        );
        let t22 = associated_token_address(
            &owner,
            &mint,
            &TOKEN_2022_PROGRAM_ID.parse().unwrap(),
            &ata_program,
        );
        assert_ne!(classic, t22);
    }

    #[test]
    fn test_found_bump_rederives_the_same_address() {
        let program: Pubkey = ASSOCIATED_TOKEN_PROGRAM_ID.parse().unwrap();
        let owner = wallet(5);
        let (address, bump) =
            Pubkey::find_program_address(&[owner.as_bytes(), b"vault"], &program).unwrap();

        let again =
            Pubkey::create_program_address(&[owner.as_bytes(), b"vault", &[bump]], &program);
        assert_eq!(again, Some(address));

        // every higher bump lands on the curve
        for higher in (bump..=u8::MAX).skip(1) {
            assert!(Pubkey::create_program_address(
                &[owner.as_bytes(), b"vault", &[higher]],
                &program
            )
            .is_none());
        }
    }

    #[test]
    fn test_oversized_seed_is_rejected() {
        let program = wallet(4);
        let long = [0u8; 33];
        assert!(Pubkey::create_program_address(&[&long], &program).is_none());
    }
}
