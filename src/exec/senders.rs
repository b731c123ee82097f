//! Solana JSON-RPC transaction channel.
//!
//! Wraps the handful of RPC methods the executors need (simulate, send,
//! confirm, blockhash) behind a transport seam, with bounded retry for
//! transient node failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Total attempts for a retryable RPC call (first try plus retries).
pub const RETRY_ATTEMPTS: usize = 3;
/// Base delay for exponential backoff between attempts.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
/// Growth cap for the backoff delay.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Errors from the RPC channel.
///
/// `is_retryable` splits these into transient faults, which are retried with
/// backoff, and deterministic failures, which surface immediately.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Network-level failure: connect, DNS, timeout
    #[error("rpc transport error: {0}")]
    Transport(String),
    /// Non-2xx HTTP response from the node
    #[error("rpc http status {status}")]
    Http { status: u16 },
    /// JSON-RPC error object returned by the node
    #[error("rpc node error {code}: {message}")]
    Node { code: i64, message: String },
    /// The transaction landed on-chain and failed
    #[error("transaction failed on-chain: {0}")]
    TransactionFailed(String),
    /// The signature never reached the requested commitment in time
    #[error("confirmation timed out after {0:.1}s")]
    ConfirmTimeout(f64),
    /// Response body did not match the expected shape
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Transient faults worth another attempt. Node codes cover internal
    /// error, node-behind, block-unavailable and rate limiting; everything
    /// else is deterministic and retrying would only repeat the failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            RpcError::Http { status } => *status == 429 || *status >= 500,
            RpcError::Node { code, .. } => matches!(code, -32603 | -32005 | -32004 | 429),
            _ => false,
        }
    }
}

/// Solana commitment levels, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommitmentLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(CommitmentLevel::Processed),
            "confirmed" => Some(CommitmentLevel::Confirmed),
            "finalized" => Some(CommitmentLevel::Finalized),
            _ => None,
        }
    }
}

/// Result of a `simulateTransaction` call. A failed simulation is data, not
/// an error: `err` carries whatever the node reported.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub err: Option<Value>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    pub raw: Value,
}

impl SimulationReport {
    pub fn succeeded(&self) -> bool {
        self.err.is_none()
    }
}

/// Parsed entry from `getSignatureStatuses`.
#[derive(Debug, Clone)]
pub struct SignatureStatus {
    pub slot: Option<u64>,
    pub confirmations: Option<u64>,
    pub err: Option<Value>,
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    fn from_value(value: &Value) -> Self {
        Self {
            slot: value.get("slot").and_then(Value::as_u64),
            confirmations: value.get("confirmations").and_then(Value::as_u64),
            err: value.get("err").filter(|e| !e.is_null()).cloned(),
            confirmation_status: value
                .get("confirmationStatus")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Latest blockhash with its expiry height.
#[derive(Debug, Clone)]
pub struct BlockhashInfo {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// Raw JSON-RPC call seam. The production transport speaks HTTP; tests
/// substitute a scripted one.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// HTTP JSON-RPC transport with monotonically increasing request ids.
pub struct HttpRpcTransport {
    client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl HttpRpcTransport {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            request_id: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(err) = body.get("error") {
            return Err(RpcError::Node {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown rpc error")
                    .to_string(),
            });
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// RPC sender for raw base64 transactions, with retry on transient faults.
pub struct RpcSender {
    transport: Arc<dyn RpcTransport>,
}

impl RpcSender {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            transport: Arc::new(HttpRpcTransport::new(rpc_url, timeout)?),
        })
    }

    /// Build a sender over a custom transport.
    pub fn with_transport(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    async fn call_with_retry(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY_MS)
            .max_delay(RETRY_MAX_DELAY)
            .take(RETRY_ATTEMPTS - 1);
        RetryIf::spawn(
            strategy,
            || self.transport.call(method, params.clone()),
            |e: &RpcError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(method, error = %e, "transient rpc failure, retrying");
                }
                retry
            },
        )
        .await
    }

    /// Simulate a signed transaction against the current bank state.
    ///
    /// Simulation failure is returned inside the report, never as an error,
    /// so callers can decide whether to proceed.
    pub async fn simulate(&self, tx_base64: &str) -> Result<SimulationReport, RpcError> {
        let params = json!([
            tx_base64,
            {
                "encoding": "base64",
                "commitment": CommitmentLevel::Processed.as_str(),
                "sigVerify": true,
                "replaceRecentBlockhash": true,
            }
        ]);
        let result = self.call_with_retry("simulateTransaction", params).await?;
        let value = result.get("value").cloned().unwrap_or(Value::Null);

        let report = SimulationReport {
            err: value.get("err").filter(|e| !e.is_null()).cloned(),
            logs: value
                .get("logs")
                .and_then(Value::as_array)
                .map(|logs| {
                    logs.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            units_consumed: value.get("unitsConsumed").and_then(Value::as_u64),
            raw: value,
        };
        if let Some(err) = &report.err {
            warn!(error = %err, "transaction simulation reported failure");
        }
        Ok(report)
    }

    /// Submit a signed base64 transaction. Returns the signature.
    pub async fn send(
        &self,
        tx_base64: &str,
        skip_preflight: bool,
        max_retries: u32,
    ) -> Result<String, RpcError> {
        let params = json!([
            tx_base64,
            {
                "encoding": "base64",
                "skipPreflight": skip_preflight,
                "maxRetries": max_retries,
                "preflightCommitment": CommitmentLevel::Processed.as_str(),
            }
        ]);
        let result = self.call_with_retry("sendTransaction", params).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResponse(format!("expected signature string, got {result}")))
    }

    /// Poll `getSignatureStatuses` until the signature reaches `commitment`.
    ///
    /// An on-chain error is terminal and reported as `TransactionFailed`;
    /// transient polling failures are logged and absorbed until the deadline.
    pub async fn confirm_signature(
        &self,
        signature: &str,
        commitment: CommitmentLevel,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<SignatureStatus, RpcError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let params = json!([[signature], {"searchTransactionHistory": true}]);

        while tokio::time::Instant::now() < deadline {
            match self
                .call_with_retry("getSignatureStatuses", params.clone())
                .await
            {
                Ok(result) => {
                    let entry = result
                        .get("value")
                        .and_then(|v| v.get(0))
                        .cloned()
                        .unwrap_or(Value::Null);
                    if !entry.is_null() {
                        let status = SignatureStatus::from_value(&entry);
                        if let Some(err) = &status.err {
                            return Err(RpcError::TransactionFailed(err.to_string()));
                        }
                        let reached = match status.confirmation_status.as_deref() {
                            Some(s) => CommitmentLevel::parse(s)
                                .is_some_and(|level| level >= commitment),
                            // Some nodes omit the status field; treat any
                            // non-null entry as processed.
                            None => commitment == CommitmentLevel::Processed,
                        };
                        if reached {
                            debug!(signature, commitment = commitment.as_str(), "signature confirmed");
                            return Ok(status);
                        }
                    }
                }
                Err(e) => {
                    warn!(signature, error = %e, "status poll failed, will retry");
                }
            }
            tokio::time::sleep(poll_interval).await;
        }

        Err(RpcError::ConfirmTimeout(timeout.as_secs_f64()))
    }

    /// Fetch the latest blockhash at the given commitment.
    pub async fn get_latest_blockhash(
        &self,
        commitment: CommitmentLevel,
    ) -> Result<BlockhashInfo, RpcError> {
        let params = json!([{"commitment": commitment.as_str()}]);
        let result = self.call_with_retry("getLatestBlockhash", params).await?;
        let value = result
            .get("value")
            .ok_or_else(|| RpcError::InvalidResponse("missing value in blockhash response".into()))?;
        let blockhash = value
            .get("blockhash")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::InvalidResponse("missing blockhash".into()))?
            .to_string();
        let last_valid_block_height = value
            .get("lastValidBlockHeight")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::InvalidResponse("missing lastValidBlockHeight".into()))?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height,
        })
    }
}
