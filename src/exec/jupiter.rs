//! Jupiter execution engine for live Solana trading.
//!
//! Every trade runs the same pipeline: quote, build swap transaction,
//! optional tip marking, sign, best-effort simulation, send. Buys and sells
//! share one internal routine parameterized by input/output mint and raw
//! amount; a buy swaps USDC into the token, a sell swaps the token back.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::exec::senders::RpcSender;
use crate::exec::signers::TxnSigner;
use crate::exec::{ExecError, ExecutionClient};
use crate::types::{
    Clock, ExecutionResult, LiveFill, QuoteSummary, SystemClock, TokenId, TokenSnapshot, TradeSide,
};

/// USDC mint, the stable quote asset for every trade.
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDC_DECIMALS: u8 = 6;

/// In-flight resubmission budget passed to `sendTransaction`.
const SEND_MAX_RETRIES: u32 = 3;

/// Query parameters for the aggregator quote endpoint. Amount is stringified
/// to avoid precision loss on large raw amounts.
pub fn build_quote_params(
    input_mint: &str,
    output_mint: &str,
    amount: u64,
    slippage_bps: u32,
    only_direct_routes: bool,
    as_legacy_transaction: bool,
) -> Vec<(String, String)> {
    vec![
        ("inputMint".to_string(), input_mint.to_string()),
        ("outputMint".to_string(), output_mint.to_string()),
        ("amount".to_string(), amount.to_string()),
        ("slippageBps".to_string(), slippage_bps.to_string()),
        ("onlyDirectRoutes".to_string(), only_direct_routes.to_string()),
        (
            "asLegacyTransaction".to_string(),
            as_legacy_transaction.to_string(),
        ),
    ]
}

/// Convert a USD notional into raw token units at the given price.
pub fn usd_to_token_amount(usd: f64, price_usd: f64, decimals: u8) -> Result<u64, ExecError> {
    if price_usd <= 0.0 {
        return Err(ExecError::InvalidAmount(format!(
            "invalid token price: {price_usd}"
        )));
    }
    Ok(((usd / price_usd) * 10f64.powi(decimals as i32)) as u64)
}

/// Convert raw token units back to a USD notional at the given price.
pub fn token_amount_to_usd(amount: u64, price_usd: f64, decimals: u8) -> f64 {
    raw_to_ui(amount, decimals) * price_usd
}

fn raw_to_ui(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// One route from the quote response. Unmodeled fields are preserved in
/// `extra` so the full route can be echoed back to the swap endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub in_amount: String,
    pub out_amount: String,
    #[serde(default)]
    pub price_impact_pct: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub quote_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    #[serde(default)]
    pub swap_transaction: Option<String>,
}

/// Aggregator HTTP seam. Tests substitute a scripted implementation.
#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn quote(&self, params: &[(String, String)]) -> Result<QuoteResponse, ExecError>;
    async fn swap(&self, request: &Value) -> Result<SwapResponse, ExecError>;
}

/// Rate-limited HTTP client for the Jupiter API.
pub struct HttpSwapApi {
    client: reqwest::Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
}

impl HttpSwapApi {
    pub fn new(base_url: &str, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        }
    }
}

#[async_trait]
impl SwapApi for HttpSwapApi {
    async fn quote(&self, params: &[(String, String)]) -> Result<QuoteResponse, ExecError> {
        self.limiter.until_ready().await;
        let url = format!("{}/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| ExecError::Api(format!("quote request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ExecError::Api(format!(
                "quote returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ExecError::Api(format!("invalid quote response: {e}")))
    }

    async fn swap(&self, request: &Value) -> Result<SwapResponse, ExecError> {
        self.limiter.until_ready().await;
        let url = format!("{}/swap", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ExecError::Api(format!("swap request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ExecError::Api(format!(
                "swap returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ExecError::Api(format!("invalid swap response: {e}")))
    }
}

/// Per-call overrides for transaction-shaping parameters. `None` falls back
/// to the configured default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeOverrides {
    pub slippage_bps: Option<u32>,
    pub priority_fee_microlamports: Option<u64>,
    pub compute_unit_limit: Option<u32>,
    pub tip_lamports: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub max_slippage_bps: u32,
    pub priority_fee_microlamports: u64,
    pub compute_unit_limit: u32,
    pub tip_lamports: u64,
    /// Validator tip account, base58. Tips are only armed when this is a
    /// non-whitespace value.
    pub tip_account_b58: Option<String>,
    /// Decimals assumed for traded tokens
    pub token_decimals: u8,
    /// Run the node-side preflight check on send
    pub enable_preflight: bool,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            max_slippage_bps: 100,
            priority_fee_microlamports: 0,
            compute_unit_limit: 120_000,
            tip_lamports: 0,
            tip_account_b58: None,
            token_decimals: 9,
            enable_preflight: true,
        }
    }
}

/// Live execution engine.
///
/// Without a signer and sender the engine still serves quotes, but any
/// buy or sell fails with `LiveTradingDisabled` before any network call.
pub struct JupiterExecutor {
    api: Arc<dyn SwapApi>,
    signer: Option<Arc<dyn TxnSigner>>,
    sender: Option<Arc<RpcSender>>,
    config: JupiterConfig,
    clock: Arc<dyn Clock>,
    // Raw token amounts from our own fills; sells are sized against this
    // ledger rather than on-chain balance lookups.
    held: Mutex<HashMap<String, u64>>,
}

impl JupiterExecutor {
    pub fn new(
        api: Arc<dyn SwapApi>,
        signer: Option<Arc<dyn TxnSigner>>,
        sender: Option<Arc<RpcSender>>,
        config: JupiterConfig,
    ) -> Self {
        if signer.is_none() || sender.is_none() {
            warn!("executor constructed without signer/sender, live trading disabled");
        }
        Self {
            api,
            signer,
            sender,
            config,
            clock: Arc::new(SystemClock),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn live_trading_enabled(&self) -> bool {
        self.signer.is_some() && self.sender.is_some()
    }

    /// Raw held amount for a mint, from this engine's own fills.
    pub fn held_amount(&self, mint: &str) -> u64 {
        self.held.lock().unwrap().get(mint).copied().unwrap_or(0)
    }

    /// Seed the held-amount ledger, e.g. when restoring positions on restart.
    pub fn set_held_amount(&self, mint: &str, amount: u64) {
        self.held.lock().unwrap().insert(mint.to_string(), amount);
    }

    /// Whether the send path should mark the transaction for a tip: requires
    /// a positive tip amount and a non-whitespace tip account.
    pub fn should_add_tip_instruction(&self, overrides: &TradeOverrides) -> bool {
        let tip = overrides.tip_lamports.unwrap_or(self.config.tip_lamports);
        tip > 0
            && self
                .config
                .tip_account_b58
                .as_deref()
                .is_some_and(|account| !account.trim().is_empty())
    }

    /// Extension point for protocol-specific tip instruction injection.
    /// The arming decision lives in `should_add_tip_instruction`; the bytes
    /// pass through unchanged until a concrete encoder is wired in.
    fn add_tip_instruction(&self, txn_bytes: Vec<u8>, overrides: &TradeOverrides) -> Vec<u8> {
        if self.should_add_tip_instruction(overrides) {
            let tip = overrides.tip_lamports.unwrap_or(self.config.tip_lamports);
            info!(tip_lamports = tip, "transaction marked for tip augmentation");
        }
        txn_bytes
    }

    /// Body for the swap endpoint. Zero-valued shaping parameters are
    /// omitted entirely so the aggregator applies its own defaults.
    pub fn build_swap_request(
        &self,
        route: &Route,
        user_public_key: &str,
        overrides: &TradeOverrides,
    ) -> Value {
        let mut body = Map::new();
        body.insert(
            "route".to_string(),
            serde_json::to_value(route).unwrap_or(Value::Null),
        );
        body.insert("userPublicKey".to_string(), json!(user_public_key));
        body.insert("wrapUnwrapSOL".to_string(), json!(true));
        body.insert("asLegacyTransaction".to_string(), json!(false));

        let priority_fee = overrides
            .priority_fee_microlamports
            .unwrap_or(self.config.priority_fee_microlamports);
        if priority_fee > 0 {
            body.insert(
                "computeUnitPriceMicroLamports".to_string(),
                json!(priority_fee),
            );
        }
        let compute_units = overrides
            .compute_unit_limit
            .unwrap_or(self.config.compute_unit_limit);
        if compute_units > 0 {
            body.insert("computeUnitLimit".to_string(), json!(compute_units));
        }
        let tip = overrides.tip_lamports.unwrap_or(self.config.tip_lamports);
        if tip > 0 {
            body.insert("prioritizationFeeLamports".to_string(), json!(tip));
        }

        Value::Object(body)
    }

    /// Configuration snapshot for audit logging. Secrets never appear here.
    pub fn config_summary(&self) -> Value {
        json!({
            "max_slippage_bps": self.config.max_slippage_bps,
            "priority_fee_microlamports": self.config.priority_fee_microlamports,
            "compute_unit_limit": self.config.compute_unit_limit,
            "tip_lamports": self.config.tip_lamports,
            "tip_account_configured": self.config.tip_account_b58.is_some(),
            "token_decimals": self.config.token_decimals,
            "enable_preflight": self.config.enable_preflight,
            "live_trading_enabled": self.live_trading_enabled(),
            "signer_configured": self.signer.is_some(),
            "sender_configured": self.sender.is_some(),
        })
    }

    /// Quote, build, sign and send one swap. Returns the selected route,
    /// the quote id, the signature and the slippage actually used.
    async fn execute_swap(
        &self,
        side: TradeSide,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        overrides: &TradeOverrides,
    ) -> Result<(Route, Option<String>, String, u32), ExecError> {
        let signer = self.signer.as_ref().ok_or(ExecError::LiveTradingDisabled)?;
        let sender = self.sender.as_ref().ok_or(ExecError::LiveTradingDisabled)?;

        let slippage_bps = overrides.slippage_bps.unwrap_or(self.config.max_slippage_bps);
        let params =
            build_quote_params(input_mint, output_mint, amount, slippage_bps, false, false);
        let quote = self.api.quote(&params).await?;
        let route = quote.routes.into_iter().next().ok_or(ExecError::NoRoute)?;

        let request = self.build_swap_request(&route, &signer.pubkey_base58(), overrides);
        let swap = self.api.swap(&request).await?;
        let tx_base64 = swap
            .swap_transaction
            .ok_or(ExecError::MissingSwapTransaction)?;
        let tx_bytes = BASE64
            .decode(tx_base64.as_bytes())
            .map_err(|e| ExecError::Api(format!("swap transaction is not valid base64: {e}")))?;

        let tx_bytes = self.add_tip_instruction(tx_bytes, overrides);
        let signed = signer
            .sign_transaction(&tx_bytes)
            .map_err(|e| ExecError::Signer(e.to_string()))?;
        let signed_base64 = BASE64.encode(&signed);

        // Pre-send simulation is best effort. False negatives are common
        // near blockhash expiry, so a failure here never aborts the trade.
        match sender.simulate(&signed_base64).await {
            Ok(report) if !report.succeeded() => {
                warn!(
                    side = side.as_str(),
                    err = ?report.err,
                    "pre-send simulation reported failure, proceeding"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    side = side.as_str(),
                    error = %e,
                    "pre-send simulation unavailable, proceeding"
                );
            }
        }

        let signature = sender
            .send(&signed_base64, !self.config.enable_preflight, SEND_MAX_RETRIES)
            .await?;
        info!(
            side = side.as_str(),
            signature,
            input_mint,
            output_mint,
            amount,
            slippage_bps,
            "swap transaction sent"
        );

        Ok((route, quote.quote_id, signature, slippage_bps))
    }

    /// Buy with per-call parameter overrides.
    pub async fn buy_with(
        &self,
        snap: &TokenSnapshot,
        usd_amount: f64,
        overrides: TradeOverrides,
    ) -> Result<ExecutionResult, ExecError> {
        if usd_amount <= 0.0 {
            return Err(ExecError::InvalidAmount(format!(
                "buy amount must be positive, got {usd_amount}"
            )));
        }
        let in_amount = (usd_amount * 10f64.powi(USDC_DECIMALS as i32)) as u64;
        let (route, quote_id, signature, slippage_bps) = self
            .execute_swap(TradeSide::Buy, USDC_MINT, &snap.token.mint, in_amount, &overrides)
            .await?;

        let out_amount: u64 = route.out_amount.parse().map_err(|_| {
            ExecError::Api(format!("invalid outAmount in route: {}", route.out_amount))
        })?;
        let qty_base = raw_to_ui(out_amount, self.config.token_decimals);
        if qty_base <= 0.0 {
            return Err(ExecError::Api("route produced zero output amount".into()));
        }

        {
            let mut held = self.held.lock().unwrap();
            *held.entry(snap.token.mint.clone()).or_insert(0) += out_amount;
        }

        Ok(ExecutionResult {
            side: TradeSide::Buy,
            token_mint: snap.token.mint.clone(),
            price_exec: usd_amount / qty_base,
            qty_base,
            gross_usd: usd_amount,
            fee_usd: 0.0,
            ts: self.clock.now(),
            realized_pnl_usd: None,
            live: Some(LiveFill {
                signature,
                quote_id,
                price_impact_pct: route.price_impact_pct,
                slippage_bps,
                route: serde_json::to_value(&route).unwrap_or(Value::Null),
            }),
        })
    }

    /// Sell a percentage of the held amount with per-call overrides.
    pub async fn sell_with(
        &self,
        token: &TokenId,
        pct: f64,
        overrides: TradeOverrides,
    ) -> Result<ExecutionResult, ExecError> {
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(ExecError::InvalidAmount(format!(
                "sell percentage must be in (0, 100], got {pct}"
            )));
        }
        let held_amount = self.held_amount(&token.mint);
        if held_amount == 0 {
            return Err(ExecError::NoPosition(token.mint.clone()));
        }
        let amount = (((held_amount as f64) * (pct / 100.0)) as u64).min(held_amount);
        if amount == 0 {
            return Err(ExecError::InvalidAmount(format!(
                "sell of {pct}% rounds to zero units"
            )));
        }

        let (route, quote_id, signature, slippage_bps) = self
            .execute_swap(TradeSide::Sell, &token.mint, USDC_MINT, amount, &overrides)
            .await?;

        let out_usdc: u64 = route.out_amount.parse().map_err(|_| {
            ExecError::Api(format!("invalid outAmount in route: {}", route.out_amount))
        })?;
        let gross_usd = raw_to_ui(out_usdc, USDC_DECIMALS);
        let qty_base = raw_to_ui(amount, self.config.token_decimals);

        {
            let mut held = self.held.lock().unwrap();
            let remaining = held_amount.saturating_sub(amount);
            if remaining == 0 {
                held.remove(&token.mint);
            } else {
                held.insert(token.mint.clone(), remaining);
            }
        }

        Ok(ExecutionResult {
            side: TradeSide::Sell,
            token_mint: token.mint.clone(),
            price_exec: gross_usd / qty_base,
            qty_base,
            gross_usd,
            fee_usd: 0.0,
            ts: self.clock.now(),
            // Cost basis is not tracked for live fills; realized P&L is
            // left for the accounting layer.
            realized_pnl_usd: None,
            live: Some(LiveFill {
                signature,
                quote_id,
                price_impact_pct: route.price_impact_pct,
                slippage_bps,
                route: serde_json::to_value(&route).unwrap_or(Value::Null),
            }),
        })
    }

    /// Quote-only simulation with per-call overrides. Works without a
    /// signer or sender.
    pub async fn simulate_with(
        &self,
        snap: &TokenSnapshot,
        usd_amount: f64,
        overrides: TradeOverrides,
    ) -> Result<QuoteSummary, ExecError> {
        if usd_amount <= 0.0 {
            return Err(ExecError::InvalidAmount(format!(
                "simulation amount must be positive, got {usd_amount}"
            )));
        }
        let slippage_bps = overrides.slippage_bps.unwrap_or(self.config.max_slippage_bps);
        let in_amount = (usd_amount * 10f64.powi(USDC_DECIMALS as i32)) as u64;
        let params = build_quote_params(
            USDC_MINT,
            &snap.token.mint,
            in_amount,
            slippage_bps,
            false,
            false,
        );
        let quote = self.api.quote(&params).await?;
        let route = quote.routes.first().ok_or(ExecError::NoRoute)?;
        let out_amount: u64 = route.out_amount.parse().map_err(|_| {
            ExecError::Api(format!("invalid outAmount in route: {}", route.out_amount))
        })?;

        Ok(QuoteSummary {
            input_mint: USDC_MINT.to_string(),
            output_mint: snap.token.mint.clone(),
            in_amount,
            out_amount,
            price_impact_pct: route.price_impact_pct,
            slippage_bps,
            ts: self.clock.now(),
        })
    }
}

#[async_trait]
impl ExecutionClient for JupiterExecutor {
    async fn simulate(
        &self,
        snap: &TokenSnapshot,
        usd_amount: f64,
    ) -> Result<QuoteSummary, ExecError> {
        self.simulate_with(snap, usd_amount, TradeOverrides::default()).await
    }

    async fn buy(&self, snap: &TokenSnapshot, usd_amount: f64) -> Result<ExecutionResult, ExecError> {
        self.buy_with(snap, usd_amount, TradeOverrides::default()).await
    }

    async fn sell(&self, token: &TokenId, pct: f64) -> Result<ExecutionResult, ExecError> {
        self.sell_with(token, pct, TradeOverrides::default()).await
    }
}
