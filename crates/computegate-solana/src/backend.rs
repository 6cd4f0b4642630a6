//! Solana token-account backend

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use computegate_chain::{
    BackendTimeouts, ChainBackend, CredentialError, RpcClient, RpcError, SigningCredential,
};
use computegate_types::{
    ChainError, ChainFamily, ChainResult, Identity, SettlementReceipt, TokenAmount,
};

use crate::pubkey::{
    associated_token_address, Pubkey, PubkeyError, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::transaction::TransferMessage;

/// SPL Token error code for a transfer exceeding the source balance
const TOKEN_ERROR_INSUFFICIENT_FUNDS: u64 = 1;

/// JSON-RPC "invalid params" code, returned for unknown token accounts
const INVALID_PARAMS: i64 = -32602;

// ============================================================================
// Configuration
// ============================================================================

/// Commitment level balances are read at and charges are confirmed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// Whether a reported `confirmationStatus` reaches this level
    pub fn is_reached_by(&self, status: Option<&str>) -> bool {
        match (self, status) {
            (_, Some("finalized")) => true,
            (Commitment::Confirmed, Some("confirmed")) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one Solana backend instance
#[derive(Debug, Clone)]
pub struct SolanaConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Token mint, base58
    pub mint: String,
    /// Token program owning the mint (SPL Token or Token-2022)
    pub token_program: String,
    /// Wallet whose associated token account receives charges; defaults to
    /// the signing key's own wallet
    pub treasury_owner: Option<String>,
    pub commitment: Commitment,
    pub timeouts: BackendTimeouts,
}

impl SolanaConfig {
    pub fn new(rpc_url: impl Into<String>, mint: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            mint: mint.into(),
            token_program: TOKEN_PROGRAM_ID.to_string(),
            treasury_owner: None,
            commitment: Commitment::default(),
            timeouts: BackendTimeouts::default(),
        }
    }
}

/// Failures while constructing a [`SolanaBackend`]
#[derive(Debug, Error)]
pub enum SolanaError {
    #[error("invalid signing credential: {0}")]
    Credential(#[from] CredentialError),

    #[error("invalid {field} address: {source}")]
    Address {
        field: &'static str,
        source: PubkeyError,
    },

    #[error("no associated token account can be derived for {owner}")]
    Derivation { owner: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Derive an ed25519 signing key from a 32-byte seed or a 64-byte keypair
/// (secret ‖ public, as written by Solana keypair files)
pub fn signing_key_from_credential(
    credential: &SigningCredential,
) -> Result<SigningKey, CredentialError> {
    let bytes = credential.expose_bytes();
    match bytes.len() {
        32 | 64 => {
            let key = SigningKey::try_from(&bytes[..32])
                .map_err(|e| CredentialError::Invalid(e.to_string()))?;
            if bytes.len() == 64 && key.verifying_key().as_bytes()[..] != bytes[32..] {
                return Err(CredentialError::Invalid(
                    "public half of keypair does not match its secret".into(),
                ));
            }
            Ok(key)
        }
        actual => Err(CredentialError::BadLength {
            expected: "32-byte seed or 64-byte keypair",
            actual,
        }),
    }
}

// ============================================================================
// RPC payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    err: Option<Value>,
    confirmation_status: Option<String>,
}

fn is_token_insufficient_funds(tx_err: &Value) -> bool {
    tx_err
        .get("InstructionError")
        .and_then(|ix| ix.get(1))
        .and_then(|e| e.get("Custom"))
        .and_then(Value::as_u64)
        == Some(TOKEN_ERROR_INSUFFICIENT_FUNDS)
}

fn is_missing_account(err: &RpcError) -> bool {
    matches!(
        err,
        RpcError::Rpc { code, message, .. }
            if *code == INVALID_PARAMS && message.contains("could not find account")
    )
}

/// Classify a failed `sendTransaction`; preflight simulation failures carry
/// the transaction error under `data.err`
fn classify_send_error(err: RpcError, signature: &str) -> ChainError {
    if let RpcError::Rpc {
        data: Some(data), ..
    } = &err
    {
        if let Some(tx_err) = data.get("err") {
            if is_token_insufficient_funds(tx_err) {
                return ChainError::insufficient_funds(format!(
                    "preflight rejected transfer: {tx_err}"
                ));
            }
        }
    }
    err.into_submit_error(signature)
}

// ============================================================================
// Backend
// ============================================================================

/// Charges SPL tokens from a holder's associated token account into the
/// treasury's, signing as the holder's approved delegate
pub struct SolanaBackend {
    rpc: RpcClient,
    signer: SigningKey,
    authority: Pubkey,
    mint: Pubkey,
    token_program: Pubkey,
    associated_program: Pubkey,
    treasury: Identity,
    treasury_account: Pubkey,
    commitment: Commitment,
    timeouts: BackendTimeouts,
}

impl SolanaBackend {
    /// Build a backend that owns `credential` for its lifetime.
    ///
    /// The raw bytes are zeroed once the typed key has been derived.
    pub fn new(config: SolanaConfig, credential: SigningCredential) -> Result<Self, SolanaError> {
        let signer = signing_key_from_credential(&credential)?;
        drop(credential);

        let authority = Pubkey::from(signer.verifying_key());
        let parse = |field: &'static str, value: &str| {
            Pubkey::from_str(value).map_err(|source| SolanaError::Address { field, source })
        };
        let mint = parse("mint", &config.mint)?;
        let token_program = parse("token program", &config.token_program)?;
        let associated_program = parse("associated token program", ASSOCIATED_TOKEN_PROGRAM_ID)?;
        let treasury_owner = match &config.treasury_owner {
            Some(owner) => parse("treasury", owner)?,
            None => authority,
        };
        let treasury_account =
            associated_token_address(&treasury_owner, &mint, &token_program, &associated_program)
                .ok_or_else(|| SolanaError::Derivation {
                    owner: treasury_owner.to_string(),
                })?;

        let rpc = RpcClient::new(config.rpc_url, config.timeouts.rpc)?;

        info!(
            rpc = rpc.url(),
            %authority,
            %mint,
            treasury = %treasury_owner,
            %treasury_account,
            commitment = %config.commitment,
            "Solana backend ready"
        );

        Ok(Self {
            rpc,
            signer,
            authority,
            mint,
            token_program,
            associated_program,
            treasury: Identity::new(treasury_owner.to_string()),
            treasury_account,
            commitment: config.commitment,
            timeouts: config.timeouts,
        })
    }

    /// Wallet address of the signing key (delegate and fee payer)
    pub fn authority(&self) -> &Pubkey {
        &self.authority
    }

    pub fn mint(&self) -> &Pubkey {
        &self.mint
    }

    /// Associated token account of `holder` for the configured mint
    pub fn token_account_of(&self, holder: &Identity) -> ChainResult<Pubkey> {
        let owner = Pubkey::from_str(holder.as_str())
            .map_err(|e| ChainError::invalid_identity(holder.as_str(), e.to_string()))?;
        associated_token_address(
            &owner,
            &self.mint,
            &self.token_program,
            &self.associated_program,
        )
        .ok_or_else(|| {
            ChainError::invalid_identity(holder.as_str(), "no associated token account address")
        })
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, RpcError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .rpc
            .request(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    async fn block_height(&self) -> Result<u64, RpcError> {
        self.rpc
            .request("getBlockHeight", json!([{ "commitment": self.commitment.as_str() }]))
            .await
    }

    /// Poll until the transfer reaches the configured commitment; returns the
    /// slot it landed in
    async fn await_confirmation(&self, signature: &str, last_valid_height: u64) -> ChainResult<u64> {
        let deadline = Instant::now() + self.timeouts.confirmation;

        loop {
            match self.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(tx_err) = status.err {
                        return Err(if is_token_insufficient_funds(&tx_err) {
                            ChainError::insufficient_funds(format!(
                                "transfer {signature} failed on-chain: {tx_err}"
                            ))
                        } else {
                            ChainError::submission(format!(
                                "transfer {signature} failed on-chain: {tx_err}"
                            ))
                        });
                    }
                    if self
                        .commitment
                        .is_reached_by(status.confirmation_status.as_deref())
                    {
                        return Ok(status.slot);
                    }
                    debug!(%signature, slot = status.slot, status = ?status.confirmation_status, "awaiting commitment");
                }
                Ok(None) => match self.block_height().await {
                    Ok(height) if height > last_valid_height => {
                        // one last look in case it landed just before expiry
                        match self.signature_status(signature).await {
                            Ok(Some(status)) => {
                                debug!(%signature, slot = status.slot, "status appeared at expiry");
                                continue;
                            }
                            Ok(None) => {
                                return Err(ChainError::submission(format!(
                                    "blockhash expired at height {height} (last valid {last_valid_height}) before {signature} landed"
                                )));
                            }
                            Err(e) => {
                                return Err(ChainError::confirmation(
                                    Some(signature.to_string()),
                                    format!("blockhash expired at height {height} but status is unknown: {e}"),
                                ));
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!(%signature, error = %e, "block height poll failed"),
                },
                Err(e) => warn!(%signature, error = %e, "signature status poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChainError::confirmation(
                    Some(signature.to_string()),
                    format!(
                        "not {} within {:?}",
                        self.commitment, self.timeouts.confirmation
                    ),
                ));
            }
            let pause: Duration = self.timeouts.poll_interval.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }
}

#[async_trait]
impl ChainBackend for SolanaBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn treasury(&self) -> &Identity {
        &self.treasury
    }

    fn validate_identity(&self, holder: &Identity) -> ChainResult<()> {
        Pubkey::from_str(holder.as_str())
            .map(|_| ())
            .map_err(|e| ChainError::invalid_identity(holder.as_str(), e.to_string()))
    }

    async fn get_balance(&self, holder: &Identity) -> ChainResult<TokenAmount> {
        let account = self.token_account_of(holder)?;

        let result: Result<WithContext<UiTokenAmount>, RpcError> = self
            .rpc
            .request(
                "getTokenAccountBalance",
                json!([account.to_string(), { "commitment": self.commitment.as_str() }]),
            )
            .await;

        match result {
            Ok(balance) => {
                let amount = balance
                    .value
                    .amount
                    .parse::<TokenAmount>()
                    .map_err(ChainError::unknown)?;
                debug!(%holder, %account, %amount, "token balance");
                Ok(amount)
            }
            Err(e) if is_missing_account(&e) => {
                debug!(%holder, %account, "token account does not exist; balance is zero");
                Ok(TokenAmount::ZERO)
            }
            Err(e) => Err(e.into_read_error()),
        }
    }

    async fn charge(
        &self,
        holder: &Identity,
        amount: TokenAmount,
    ) -> ChainResult<SettlementReceipt> {
        let source = self.token_account_of(holder)?;
        if source == self.treasury_account {
            return Err(ChainError::submission(
                "holder's token account is the treasury account",
            ));
        }
        let amount_u64 = amount.to_u64().map_err(ChainError::submission)?;

        let latest: WithContext<LatestBlockhash> = self
            .rpc
            .request(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await
            .map_err(|e| ChainError::submission(format!("could not fetch a recent blockhash: {e}")))?;
        let blockhash = Pubkey::from_str(&latest.value.blockhash)
            .map_err(|e| ChainError::submission(format!("node returned a bad blockhash: {e}")))?;

        let signed = TransferMessage {
            authority: self.authority,
            source,
            destination: self.treasury_account,
            token_program: self.token_program,
            amount: amount_u64,
            recent_blockhash: *blockhash.as_bytes(),
        }
        .sign(&self.signer);
        let signature = signed.signature_b58();

        info!(%holder, %amount, %signature, "submitting token transfer");

        let sent: String = self
            .rpc
            .request(
                "sendTransaction",
                json!([
                    BASE64.encode(&signed.wire),
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": self.commitment.as_str(),
                    }
                ]),
            )
            .await
            .map_err(|e| {
                let err = classify_send_error(e, &signature);
                warn!(%holder, %signature, code = err.error_code(), error = %err, "transfer not accepted");
                err
            })?;
        if sent != signature {
            warn!(local = %signature, reported = %sent, "node reported a different signature");
        }

        let slot = self
            .await_confirmation(&signature, latest.value.last_valid_block_height)
            .await?;

        info!(%holder, %amount, %signature, slot, "token transfer confirmed");

        Ok(SettlementReceipt::confirmed(
            signature,
            ChainFamily::Solana,
            holder.clone(),
            self.treasury.clone(),
            amount,
            Some(slot),
        ))
    }
}

impl std::fmt::Debug for SolanaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaBackend")
            .field("rpc", &self.rpc)
            .field("authority", &self.authority)
            .field("mint", &self.mint)
            .field("treasury", &self.treasury)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}
