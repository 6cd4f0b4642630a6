//! Gate Configuration
//!
//! Loaded from an optional file (TOML, JSON or YAML), `config/default`,
//! `config/local` and `COMPUTEGATE__*` environment variables, in that order
//! of precedence (later wins).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use computegate_chain::{
    BackendTimeouts, CredentialError, SigningCredential, DEFAULT_CONFIRMATION_TIMEOUT,
    DEFAULT_POLL_INTERVAL, DEFAULT_RPC_TIMEOUT,
};
use computegate_evm::{BlockTag, DEFAULT_GAS_LIMIT};
use computegate_meter::MeterSettings;
use computegate_pricing::PricingConfig;
use computegate_solana::{Commitment, TOKEN_PROGRAM_ID};
use computegate_types::TokenAmount;

/// Environment variable read for the signing key when none is configured
pub const DEFAULT_CREDENTIAL_ENV: &str = "COMPUTEGATE_SIGNING_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("signing key not found: set {env} or credential_file")]
    MissingCredential { env: String },

    #[error("could not read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Ledger backend
    #[serde(default)]
    pub chain: ChainSettings,

    /// Pricing policy
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Meter timeouts, retries and ordering
    #[serde(default)]
    pub meter: MeterSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which ledger to meter against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ChainSettings {
    Solana(SolanaSettings),
    Evm(EvmSettings),
    Memory(MemorySettings),
}

impl Default for ChainSettings {
    fn default() -> Self {
        ChainSettings::Memory(MemorySettings::default())
    }
}

/// Where the signing key comes from.
///
/// The key itself is never part of the configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSource {
    /// Environment variable holding the key (hex or JSON byte array)
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// File holding the key; takes precedence over the environment
    #[serde(default)]
    pub credential_file: Option<PathBuf>,
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self {
            credential_env: default_credential_env(),
            credential_file: None,
        }
    }
}

impl CredentialSource {
    pub fn load(&self) -> Result<SigningCredential, ConfigError> {
        let raw = match &self.credential_file {
            Some(path) => Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
                ConfigError::KeyFile {
                    path: path.clone(),
                    source,
                }
            })?),
            None => Zeroizing::new(std::env::var(&self.credential_env).map_err(|_| {
                ConfigError::MissingCredential {
                    env: self.credential_env.clone(),
                }
            })?),
        };
        Ok(SigningCredential::parse(&raw)?)
    }
}

/// RPC and confirmation timing shared by both network backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: default_rpc_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TimeoutSettings {
    pub fn backend_timeouts(&self) -> BackendTimeouts {
        BackendTimeouts {
            rpc: Duration::from_millis(self.rpc_timeout_ms),
            confirmation: Duration::from_millis(self.confirmation_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// Solana SPL token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaSettings {
    pub rpc_url: String,

    /// Token mint (base58)
    pub mint: String,

    #[serde(default = "default_token_program")]
    pub token_program: String,

    /// Wallet receiving charges; defaults to the signing key's wallet
    #[serde(default)]
    pub treasury: Option<String>,

    #[serde(default)]
    pub commitment: Commitment,

    #[serde(flatten)]
    pub timeouts: TimeoutSettings,

    #[serde(flatten)]
    pub credential: CredentialSource,
}

/// EVM ERC-20 settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmSettings {
    pub rpc_url: String,

    /// ERC-20 contract address
    pub token: String,

    /// Account receiving charges; defaults to the signer's address
    #[serde(default)]
    pub treasury: Option<String>,

    /// Queried with `eth_chainId` when unset
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    #[serde(default)]
    pub block_tag: BlockTag,

    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    #[serde(flatten)]
    pub timeouts: TimeoutSettings,

    #[serde(flatten)]
    pub credential: CredentialSource,
}

/// In-process ledger for dry runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_memory_treasury")]
    pub treasury: String,

    /// Opening balances
    #[serde(default)]
    pub balances: Vec<OpeningBalance>,
}

/// Holder addresses are kept as values, not keys, so their case survives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningBalance {
    pub holder: String,
    pub amount: TokenAmount,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            treasury: default_memory_treasury(),
            balances: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_credential_env() -> String {
    DEFAULT_CREDENTIAL_ENV.to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT.as_millis() as u64
}

fn default_confirmation_timeout_ms() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT.as_millis() as u64
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_token_program() -> String {
    TOKEN_PROGRAM_ID.to_string()
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_confirmations() -> u64 {
    1
}

fn default_memory_treasury() -> String {
    "treasury".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl GateConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        builder = builder.add_source(
            config::Environment::with_prefix("COMPUTEGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
