//! ERC-20 account-balance backend

use std::str::FromStr;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use computegate_chain::{
    BackendTimeouts, ChainBackend, CredentialError, RpcClient, RpcError, SigningCredential,
};
use computegate_types::{
    ChainError, ChainFamily, ChainResult, Identity, SettlementReceipt, TokenAmount,
};

use crate::abi::{self, Revert};
use crate::address::{Address, AddressError};
use crate::transaction::LegacyTransaction;

/// Gas limit for `transferFrom` when none is configured
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

// ============================================================================
// Configuration
// ============================================================================

/// Block the balance is read at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    #[default]
    Latest,
    Safe,
    Finalized,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Latest => "latest",
            BlockTag::Safe => "safe",
            BlockTag::Finalized => "finalized",
        }
    }
}

/// Settings for one EVM backend instance
#[derive(Debug, Clone)]
pub struct EvmConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// ERC-20 contract address
    pub token: String,
    /// Account that receives charges; defaults to the signer's address
    pub treasury: Option<String>,
    /// Chain id for EIP-155; queried with `eth_chainId` when unset
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    pub block_tag: BlockTag,
    /// Blocks (including the inclusion block) before a receipt counts as
    /// confirmed
    pub confirmations: u64,
    pub timeouts: BackendTimeouts,
}

impl EvmConfig {
    pub fn new(rpc_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            token: token.into(),
            treasury: None,
            chain_id: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            block_tag: BlockTag::default(),
            confirmations: 1,
            timeouts: BackendTimeouts::default(),
        }
    }
}

/// Failures while constructing an [`EvmBackend`]
#[derive(Debug, Error)]
pub enum EvmError {
    #[error("invalid signing credential: {0}")]
    Credential(#[from] CredentialError),

    #[error("invalid {field} address: {source}")]
    Address {
        field: &'static str,
        source: AddressError,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Derive a secp256k1 signing key from a 32-byte secret
pub fn signing_key_from_credential(
    credential: &SigningCredential,
) -> Result<SigningKey, CredentialError> {
    let bytes = credential.expose_bytes();
    if bytes.len() != 32 {
        return Err(CredentialError::BadLength {
            expected: "32-byte secp256k1 secret",
            actual: bytes.len(),
        });
    }
    SigningKey::from_slice(bytes).map_err(|e| CredentialError::Invalid(e.to_string()))
}

// ============================================================================
// RPC helpers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

fn parse_quantity(value: &str) -> Result<u128, ChainError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u128::from_str_radix(digits, 16)
        .map_err(|_| ChainError::unknown(format!("invalid hex quantity {value:?}")))
}

fn quantity_u64(value: &str) -> Result<u64, ChainError> {
    let wide = parse_quantity(value)?;
    u64::try_from(wide).map_err(|_| ChainError::unknown(format!("quantity {value} exceeds u64")))
}

/// Revert payload of an `eth_call`/`eth_estimateGas` error; nodes send either
/// a hex string or an object carrying one
fn revert_data(data: Option<&Value>) -> Option<Vec<u8>> {
    let hex_data = match data? {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("data")?.as_str()?,
        _ => return None,
    };
    abi::decode_hex(hex_data).ok()
}

/// Classify a reverted `transferFrom` call; `stage` names where it reverted.
/// Either way the transfer did not move funds.
fn classify_revert(err: RpcError, stage: &str) -> ChainError {
    if let RpcError::Rpc { message, data, .. } = &err {
        let revert = revert_data(data.as_ref())
            .map(|bytes| Revert::from_data(&bytes))
            .unwrap_or(Revert::Opaque);
        if revert.is_balance() || abi::mentions_balance(message) {
            return ChainError::insufficient_funds(format!("{stage} reverted: {message}"));
        }
        return ChainError::submission(format!("{stage} reverted ({revert:?}): {message}"));
    }
    ChainError::submission(format!("{stage} failed: {err}"))
}

/// The node already holds this exact transaction
fn is_already_known(err: &RpcError) -> bool {
    match err {
        RpcError::Rpc { message, .. } => {
            let message = message.to_ascii_lowercase();
            message.contains("already known") || message.contains("known transaction")
        }
        _ => false,
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Charges ERC-20 tokens with `transferFrom`, the signer acting as the
/// holder's approved spender
pub struct EvmBackend {
    rpc: RpcClient,
    signer: SigningKey,
    sender: Address,
    token: Address,
    treasury: Identity,
    treasury_address: Address,
    configured_chain_id: Option<u64>,
    chain_id: OnceCell<u64>,
    gas_limit: u64,
    block_tag: BlockTag,
    confirmations: u64,
    timeouts: BackendTimeouts,
    /// Held from nonce lookup through broadcast so concurrent charges never
    /// reuse a nonce
    submit_lock: Mutex<()>,
}

impl EvmBackend {
    /// Build a backend that owns `credential` for its lifetime.
    ///
    /// The raw bytes are zeroed once the typed key has been derived.
    pub fn new(config: EvmConfig, credential: SigningCredential) -> Result<Self, EvmError> {
        let signer = signing_key_from_credential(&credential)?;
        drop(credential);

        let sender = Address::from_verifying_key(signer.verifying_key());
        let parse = |field: &'static str, value: &str| {
            Address::from_str(value).map_err(|source| EvmError::Address { field, source })
        };
        let token = parse("token", &config.token)?;
        let treasury_address = match &config.treasury {
            Some(treasury) => parse("treasury", treasury)?,
            None => sender,
        };

        let rpc = RpcClient::new(config.rpc_url, config.timeouts.rpc)?;

        info!(
            rpc = rpc.url(),
            %sender,
            %token,
            treasury = %treasury_address,
            block_tag = config.block_tag.as_str(),
            confirmations = config.confirmations,
            "EVM backend ready"
        );

        Ok(Self {
            rpc,
            signer,
            sender,
            token,
            treasury: Identity::new(treasury_address.to_checksum()),
            treasury_address,
            configured_chain_id: config.chain_id,
            chain_id: OnceCell::new(),
            gas_limit: config.gas_limit,
            block_tag: config.block_tag,
            confirmations: config.confirmations.max(1),
            timeouts: config.timeouts,
            submit_lock: Mutex::new(()),
        })
    }

    /// Address of the signing key (spender and gas payer)
    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn token(&self) -> &Address {
        &self.token
    }

    fn parse_holder(&self, holder: &Identity) -> ChainResult<Address> {
        let address = Address::from_str(holder.as_str())
            .map_err(|e| ChainError::invalid_identity(holder.as_str(), e.to_string()))?;
        if address.is_zero() {
            return Err(ChainError::invalid_identity(
                holder.as_str(),
                "the zero address cannot hold tokens",
            ));
        }
        Ok(address)
    }

    fn call_params(&self, from: Option<&Address>, data: &[u8], block: &str) -> Value {
        let mut call = json!({
            "to": self.token.to_checksum(),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = from {
            call["from"] = json!(from.to_checksum());
        }
        json!([call, block])
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        if let Some(id) = self.configured_chain_id {
            return Ok(id);
        }
        self.chain_id
            .get_or_try_init(|| async {
                let id: String = self
                    .rpc
                    .request("eth_chainId", json!([]))
                    .await
                    .map_err(RpcError::into_read_error)?;
                quantity_u64(&id)
            })
            .await
            .copied()
    }

    /// Replay a reverted transfer at its block to learn why it reverted.
    /// Only a balance revert is `InsufficientFunds`; out-of-gas, allowance
    /// or paused-token reverts are `Submission`.
    async fn explain_revert(
        &self,
        tx_hash: &str,
        data: &[u8],
        receipt: &TransactionReceipt,
    ) -> ChainError {
        let block = receipt.block_number.as_deref().unwrap_or("latest");
        let replay: Result<String, RpcError> = self
            .rpc
            .request("eth_call", self.call_params(Some(&self.sender), data, block))
            .await;
        let err = match replay {
            Ok(_) => ChainError::submission(format!(
                "transfer {tx_hash} reverted on-chain; replay at {block} succeeded (likely out of gas)"
            )),
            Err(e) => classify_revert(e, &format!("transfer {tx_hash}")),
        };
        warn!(%tx_hash, block, code = err.error_code(), error = %err, "transfer reverted on-chain");
        err
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<u128, ChainError> {
        let value: String = self
            .rpc
            .request(method, params)
            .await
            .map_err(RpcError::into_read_error)?;
        parse_quantity(&value)
    }

    /// Poll for the receipt and the configured depth; returns the block number
    async fn await_receipt(&self, tx_hash: &str, data: &[u8]) -> ChainResult<u64> {
        let deadline = Instant::now() + self.timeouts.confirmation;

        loop {
            match self
                .rpc
                .request_nullable::<_, TransactionReceipt>("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(Some(receipt)) => {
                    if receipt.status.as_deref() == Some("0x0") {
                        return Err(self.explain_revert(tx_hash, data, &receipt).await);
                    }
                    if let Some(block) = receipt.block_number.as_deref() {
                        let block = quantity_u64(block)?;
                        if self.confirmations <= 1 {
                            return Ok(block);
                        }
                        match self.quantity("eth_blockNumber", json!([])).await {
                            Ok(head) if head + 1 >= u128::from(block) + u128::from(self.confirmations) => {
                                return Ok(block);
                            }
                            Ok(head) => {
                                debug!(%tx_hash, block, head = head as u64, "awaiting confirmation depth")
                            }
                            Err(e) => debug!(%tx_hash, error = %e, "block number poll failed"),
                        }
                    }
                }
                Ok(None) => debug!(%tx_hash, "receipt not yet available"),
                Err(e) => warn!(%tx_hash, error = %e, "receipt poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChainError::confirmation(
                    Some(tx_hash.to_string()),
                    format!(
                        "no receipt at depth {} within {:?}",
                        self.confirmations, self.timeouts.confirmation
                    ),
                ));
            }
            tokio::time::sleep(self.timeouts.poll_interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl ChainBackend for EvmBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn treasury(&self) -> &Identity {
        &self.treasury
    }

    fn validate_identity(&self, holder: &Identity) -> ChainResult<()> {
        self.parse_holder(holder).map(|_| ())
    }

    async fn get_balance(&self, holder: &Identity) -> ChainResult<TokenAmount> {
        let address = self.parse_holder(holder)?;

        let result: String = self
            .rpc
            .request(
                "eth_call",
                self.call_params(None, &abi::balance_of(&address), self.block_tag.as_str()),
            )
            .await
            .map_err(RpcError::into_read_error)?;

        let balance = abi::decode_uint(&result)
            .map_err(|e| ChainError::unknown(format!("balanceOf returned {result:?}: {e}")))?;
        debug!(%holder, %balance, block = self.block_tag.as_str(), "token balance");
        Ok(balance)
    }

    async fn charge(
        &self,
        holder: &Identity,
        amount: TokenAmount,
    ) -> ChainResult<SettlementReceipt> {
        let from = self.parse_holder(holder)?;
        if from == self.treasury_address {
            return Err(ChainError::submission("holder is the treasury account"));
        }
        let data = abi::transfer_from(&from, &self.treasury_address, amount);

        let signed = {
            let _guard = self.submit_lock.lock().await;

            // Anything failing before broadcast leaves nothing on-chain.
            let pre_send = |e: ChainError| ChainError::submission(format!("preparing transfer: {e}"));

            let _: String = self
                .rpc
                .request("eth_call", self.call_params(Some(&self.sender), &data, "pending"))
                .await
                .map_err(|e| classify_revert(e, "transfer simulation"))?;

            let chain_id = self.chain_id().await.map_err(pre_send)?;
            let nonce = self
                .quantity(
                    "eth_getTransactionCount",
                    json!([self.sender.to_checksum(), "pending"]),
                )
                .await
                .and_then(|n| {
                    u64::try_from(n).map_err(|_| ChainError::unknown("nonce exceeds u64"))
                })
                .map_err(pre_send)?;
            let gas_price = self
                .quantity("eth_gasPrice", json!([]))
                .await
                .map_err(pre_send)?;

            let signed = LegacyTransaction {
                nonce,
                gas_price,
                gas_limit: self.gas_limit,
                to: self.token,
                value: 0,
                data: data.clone(),
                chain_id,
            }
            .sign(&self.signer)
            .map_err(ChainError::submission)?;
            let tx_hash = signed.hash_hex();

            info!(%holder, %amount, %tx_hash, nonce, gas_price = gas_price as u64, "submitting token transfer");

            let sent: Result<String, RpcError> = self
                .rpc
                .request("eth_sendRawTransaction", json!([signed.raw_hex()]))
                .await;
            match sent {
                Ok(reported) if !reported.eq_ignore_ascii_case(&tx_hash) => {
                    warn!(local = %tx_hash, %reported, "node reported a different transaction hash");
                }
                Ok(_) => {}
                Err(e) if is_already_known(&e) => {
                    debug!(%tx_hash, "transaction already known to the node");
                }
                Err(e) => {
                    let err = e.into_submit_error(&tx_hash);
                    warn!(%holder, %tx_hash, code = err.error_code(), error = %err, "transfer not accepted");
                    return Err(err);
                }
            }
            signed
        };

        let tx_hash = signed.hash_hex();
        let block = self.await_receipt(&tx_hash, &data).await?;

        info!(%holder, %amount, %tx_hash, block, "token transfer confirmed");

        Ok(SettlementReceipt::confirmed(
            tx_hash,
            ChainFamily::Evm,
            holder.clone(),
            self.treasury.clone(),
            amount,
            Some(block),
        ))
    }
}

impl std::fmt::Debug for EvmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmBackend")
            .field("rpc", &self.rpc)
            .field("sender", &self.sender)
            .field("token", &self.token)
            .field("treasury", &self.treasury)
            .field("block_tag", &self.block_tag)
            .finish_non_exhaustive()
    }
}
