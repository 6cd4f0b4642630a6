//! Compute Gate Solana - SPL token backend
//!
//! Holders are wallet addresses; their tokens live in the associated token
//! account derived from wallet, token program and mint. A charge is a single
//! SPL `Transfer` from that account into the treasury's associated token
//! account, signed by the backend key acting as the holder's approved
//! delegate and paying the fee.
//!
//! ```ignore
//! let config = SolanaConfig::new("https://api.devnet.solana.com", MINT);
//! let backend = SolanaBackend::new(config, SigningCredential::parse(&keypair_json)?)?;
//! let balance = backend.get_balance(&Identity::new(holder)).await?;
//! ```

pub mod backend;
pub mod pubkey;
pub mod transaction;

pub use backend::{signing_key_from_credential, Commitment, SolanaBackend, SolanaConfig, SolanaError};
pub use pubkey::{
    associated_token_address, Pubkey, PubkeyError, ASSOCIATED_TOKEN_PROGRAM_ID,
    TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
