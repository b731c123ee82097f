//! Trade execution: the live Jupiter engine, the paper engine, and the
//! signing/sending plumbing they share.

pub mod jupiter;
pub mod paper;
pub mod senders;
pub mod signers;

use async_trait::async_trait;
use thiserror::Error;

pub use jupiter::{HttpSwapApi, JupiterConfig, JupiterExecutor, SwapApi, TradeOverrides, USDC_MINT};
pub use paper::PaperExecutor;
pub use senders::{CommitmentLevel, RpcError, RpcSender, RpcTransport};
pub use signers::{KeypairSigner, TxnSigner};

use crate::types::{ExecutionResult, QuoteSummary, TokenId, TokenSnapshot};

#[derive(Debug, Error)]
pub enum ExecError {
    /// Signer or sender not configured; no live trade may proceed
    #[error("live trading is disabled: signer and sender are not configured")]
    LiveTradingDisabled,
    /// The aggregator returned an empty route list
    #[error("no route available for quote")]
    NoRoute,
    /// The swap endpoint responded without a transaction payload
    #[error("no swap transaction in response")]
    MissingSwapTransaction,
    /// Sell requested against a token we do not hold
    #[error("no position to sell for token {0}")]
    NoPosition(String),
    #[error("invalid trade amount: {0}")]
    InvalidAmount(String),
    /// Aggregator API failure (HTTP, decode, malformed body)
    #[error("swap api error: {0}")]
    Api(String),
    #[error("signing failed: {0}")]
    Signer(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Uniform trade surface. Live and paper engines implement the same
/// contract so the strategy layer never knows which one it is driving.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Quote-only projection of a buy; performs no trade.
    async fn simulate(
        &self,
        snap: &TokenSnapshot,
        usd_amount: f64,
    ) -> Result<QuoteSummary, ExecError>;

    /// Buy `usd_amount` worth of the snapshot's token.
    async fn buy(&self, snap: &TokenSnapshot, usd_amount: f64) -> Result<ExecutionResult, ExecError>;

    /// Sell `pct` percent (0-100] of the held amount of `token`.
    async fn sell(&self, token: &TokenId, pct: f64) -> Result<ExecutionResult, ExecError>;
}
