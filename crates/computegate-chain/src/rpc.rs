//! JSON-RPC 2.0 transport shared by the network backends
//!
//! Both ledger families speak JSON-RPC over HTTP. This client owns request
//! ids, the per-request timeout and the envelope; the backends own method
//! names and the classification of failures into [`ChainError`] kinds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use computegate_types::ChainError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

static RPC_ID: AtomicU64 = AtomicU64::new(1);

/// Transport-level failure of one JSON-RPC call
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport error talking to {url}: {message}")]
    Transport {
        url: String,
        message: String,
        /// The request never reached the server
        connect: bool,
        /// The per-request timeout elapsed
        timed_out: bool,
    },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("rpc response had no result")]
    MissingResult,

    #[error("could not decode rpc response: {0}")]
    Decode(String),
}

impl RpcError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return RpcError::Decode(err.to_string());
        }
        RpcError::Transport {
            url: url.to_string(),
            message: err.to_string(),
            connect: err.is_connect(),
            timed_out: err.is_timeout(),
        }
    }

    /// Classify a failed read (balance, blockhash, nonce, receipt polling)
    pub fn into_read_error(self) -> ChainError {
        let transient = match &self {
            RpcError::Transport { .. } => true,
            RpcError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        };
        if transient {
            ChainError::connectivity(self)
        } else {
            ChainError::unknown(self)
        }
    }

    /// Classify a failed transaction submission.
    ///
    /// Only a refused connection proves the transaction never left the
    /// process; any failure after the request was written may hide an
    /// accepted transaction, so it is reported as ambiguous with the locally
    /// computed transaction id.
    pub fn into_submit_error(self, transaction_id: &str) -> ChainError {
        let ambiguous = match &self {
            RpcError::Transport { connect, .. } => !connect,
            RpcError::Http { status, .. } => *status >= 500,
            RpcError::Rpc { .. } => false,
            RpcError::MissingResult | RpcError::Decode(_) => true,
        };
        if ambiguous {
            ChainError::confirmation(Some(transaction_id.to_string()), self)
        } else {
            ChainError::submission(self)
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    data: Option<serde_json::Value>,
}

/// JSON-RPC client bound to one endpoint
#[derive(Clone)]
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
}

impl RpcClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RpcError::from_reqwest(&url, e))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and require a non-null result
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_nullable(method, params)
            .await?
            .ok_or(RpcError::MissingResult)
    }

    /// Call `method`; a `null` result is `Ok(None)` (e.g. a receipt that
    /// does not exist yet)
    pub async fn request_nullable<P, R>(&self, method: &str, params: P) -> Result<Option<R>, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = RPC_ID.fetch_add(1, Ordering::Relaxed);
        let payload = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(rpc_id = id, method, url = %self.url, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RpcError::from_reqwest(&self.url, e))?;
        if let Some(error) = body.error {
            debug!(rpc_id = id, method, code = error.code, "rpc error response");
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        Ok(body.result)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("url", &self.url).finish()
    }
}
