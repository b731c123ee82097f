//! End-to-end tests for the live execution pipeline against scripted
//! aggregator and RPC seams.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::snapshot;
use mintrunner::exec::jupiter::{QuoteResponse, Route, SwapResponse};
use mintrunner::exec::senders::RpcError;
use mintrunner::exec::{
    ExecError, ExecutionClient, JupiterConfig, JupiterExecutor, RpcSender, RpcTransport, SwapApi,
    TradeOverrides, TxnSigner, USDC_MINT,
};
use mintrunner::types::{TokenId, TradeSide};
use serde_json::{json, Map, Value};

/// Aggregator stub returning fixed responses and capturing request bodies.
struct ScriptedSwapApi {
    quote: Mutex<Result<QuoteResponse, String>>,
    swap: Mutex<Result<SwapResponse, String>>,
    quote_params: Mutex<Vec<Vec<(String, String)>>>,
    swap_requests: Mutex<Vec<Value>>,
}

impl ScriptedSwapApi {
    fn new(quote: QuoteResponse, swap: SwapResponse) -> Arc<Self> {
        Arc::new(Self {
            quote: Mutex::new(Ok(quote)),
            swap: Mutex::new(Ok(swap)),
            quote_params: Mutex::new(Vec::new()),
            swap_requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SwapApi for ScriptedSwapApi {
    async fn quote(&self, params: &[(String, String)]) -> Result<QuoteResponse, ExecError> {
        self.quote_params.lock().unwrap().push(params.to_vec());
        self.quote
            .lock()
            .unwrap()
            .clone()
            .map_err(ExecError::Api)
    }

    async fn swap(&self, request: &Value) -> Result<SwapResponse, ExecError> {
        self.swap_requests.lock().unwrap().push(request.clone());
        self.swap.lock().unwrap().clone().map_err(ExecError::Api)
    }
}

struct StaticSigner;

impl TxnSigner for StaticSigner {
    fn pubkey_base58(&self) -> String {
        "TestPubkey111".to_string()
    }

    fn sign_transaction(&self, txn_bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut signed = vec![0u8; 64];
        signed.extend_from_slice(txn_bytes);
        Ok(signed)
    }
}

/// RPC stub: simulation succeeds, send returns a fixed signature.
struct HappyRpc;

#[async_trait]
impl RpcTransport for HappyRpc {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        match method {
            "simulateTransaction" => Ok(json!({
                "context": {"slot": 1},
                "value": {"err": null, "logs": [], "unitsConsumed": 40_000},
            })),
            "sendTransaction" => Ok(json!("live_sig_111")),
            other => Err(RpcError::InvalidResponse(format!("unexpected method {other}"))),
        }
    }
}

fn route(in_amount: &str, out_amount: &str) -> Route {
    Route {
        id: Some("r1".to_string()),
        in_amount: in_amount.to_string(),
        out_amount: out_amount.to_string(),
        price_impact_pct: 0.2,
        extra: Map::new(),
    }
}

fn quote_with(routes: Vec<Route>) -> QuoteResponse {
    QuoteResponse {
        routes,
        quote_id: Some("q-123".to_string()),
    }
}

fn swap_tx() -> SwapResponse {
    SwapResponse {
        // base64 of arbitrary transaction bytes
        swap_transaction: Some("dHJhbnNhY3Rpb24tYnl0ZXM=".to_string()),
    }
}

fn live_executor(api: Arc<ScriptedSwapApi>, config: JupiterConfig) -> JupiterExecutor {
    JupiterExecutor::new(
        api,
        Some(Arc::new(StaticSigner)),
        Some(Arc::new(RpcSender::with_transport(Arc::new(HappyRpc)))),
        config,
    )
}

#[tokio::test]
async fn buy_runs_the_full_pipeline() {
    // $50 of USDC buys 200 tokens at 9 decimals.
    let api = ScriptedSwapApi::new(
        quote_with(vec![route("50000000", "200000000000")]),
        swap_tx(),
    );
    let exec = live_executor(api.clone(), JupiterConfig::default());

    let result = exec.buy(&snapshot("MintA", 0.25), 50.0).await.unwrap();

    assert_eq!(result.side, TradeSide::Buy);
    assert_eq!(result.qty_base, 200.0);
    assert_eq!(result.gross_usd, 50.0);
    assert!((result.price_exec - 0.25).abs() < 1e-12);

    let live = result.live.unwrap();
    assert_eq!(live.signature, "live_sig_111");
    assert_eq!(live.quote_id.as_deref(), Some("q-123"));
    assert_eq!(live.slippage_bps, 100);

    // Quote asked for USDC -> token with the raw USDC amount.
    let params = api.quote_params.lock().unwrap();
    let first: std::collections::HashMap<_, _> = params[0].iter().cloned().collect();
    assert_eq!(first["inputMint"], USDC_MINT);
    assert_eq!(first["outputMint"], "MintA");
    assert_eq!(first["amount"], "50000000");

    // Swap request carried the signer's pubkey and the echoed route.
    let requests = api.swap_requests.lock().unwrap();
    assert_eq!(requests[0]["userPublicKey"], "TestPubkey111");
    assert_eq!(requests[0]["route"]["outAmount"], "200000000000");

    // Fill is tracked for later sells.
    assert_eq!(exec.held_amount("MintA"), 200_000_000_000);
}

#[tokio::test]
async fn sell_uses_tracked_holdings() {
    let api = ScriptedSwapApi::new(
        quote_with(vec![route("100000000000", "60000000")]),
        swap_tx(),
    );
    let exec = live_executor(api.clone(), JupiterConfig::default());
    exec.set_held_amount("MintA", 200_000_000_000);

    let result = exec.sell(&TokenId::sol("MintA"), 50.0).await.unwrap();

    assert_eq!(result.side, TradeSide::Sell);
    // Half the holding, 100 tokens, sold for 60 USDC.
    assert_eq!(result.qty_base, 100.0);
    assert_eq!(result.gross_usd, 60.0);
    assert!((result.price_exec - 0.6).abs() < 1e-12);
    assert_eq!(exec.held_amount("MintA"), 100_000_000_000);

    let params = api.quote_params.lock().unwrap();
    let first: std::collections::HashMap<_, _> = params[0].iter().cloned().collect();
    assert_eq!(first["inputMint"], "MintA");
    assert_eq!(first["outputMint"], USDC_MINT);
    assert_eq!(first["amount"], "100000000000");
}

#[tokio::test]
async fn sell_everything_clears_the_ledger() {
    let api = ScriptedSwapApi::new(
        quote_with(vec![route("200000000000", "120000000")]),
        swap_tx(),
    );
    let exec = live_executor(api, JupiterConfig::default());
    exec.set_held_amount("MintA", 200_000_000_000);

    exec.sell(&TokenId::sol("MintA"), 100.0).await.unwrap();
    assert_eq!(exec.held_amount("MintA"), 0);

    let err = exec.sell(&TokenId::sol("MintA"), 50.0).await.unwrap_err();
    assert!(matches!(err, ExecError::NoPosition(_)));
}

#[tokio::test]
async fn trading_disabled_without_signer_and_sender() {
    let api = ScriptedSwapApi::new(quote_with(vec![route("1", "1")]), swap_tx());
    let exec = JupiterExecutor::new(api, None, None, JupiterConfig::default());
    assert!(!exec.live_trading_enabled());

    let err = exec.buy(&snapshot("MintA", 1.0), 50.0).await.unwrap_err();
    assert!(matches!(err, ExecError::LiveTradingDisabled));
    exec.set_held_amount("MintA", 1_000);
    let err = exec.sell(&TokenId::sol("MintA"), 50.0).await.unwrap_err();
    assert!(matches!(err, ExecError::LiveTradingDisabled));
}

#[tokio::test]
async fn quotes_work_without_live_credentials() {
    let api = ScriptedSwapApi::new(
        quote_with(vec![route("50000000", "200000000000")]),
        swap_tx(),
    );
    let exec = JupiterExecutor::new(api, None, None, JupiterConfig::default());

    let quote = exec.simulate(&snapshot("MintA", 0.25), 50.0).await.unwrap();
    assert_eq!(quote.in_amount, 50_000_000);
    assert_eq!(quote.out_amount, 200_000_000_000);
    assert_eq!(quote.output_mint, "MintA");
}

#[tokio::test]
async fn empty_route_list_is_an_error() {
    let api = ScriptedSwapApi::new(quote_with(vec![]), swap_tx());
    let exec = live_executor(api, JupiterConfig::default());

    let err = exec.buy(&snapshot("MintA", 1.0), 50.0).await.unwrap_err();
    assert!(matches!(err, ExecError::NoRoute));
}

#[tokio::test]
async fn missing_swap_transaction_is_an_error() {
    let api = ScriptedSwapApi::new(
        quote_with(vec![route("50000000", "200000000000")]),
        SwapResponse::default(),
    );
    let exec = live_executor(api, JupiterConfig::default());

    let err = exec.buy(&snapshot("MintA", 1.0), 50.0).await.unwrap_err();
    assert!(matches!(err, ExecError::MissingSwapTransaction));
}

#[tokio::test]
async fn overrides_shape_the_swap_request() {
    let api = ScriptedSwapApi::new(
        quote_with(vec![route("50000000", "200000000000")]),
        swap_tx(),
    );
    let exec = live_executor(
        api.clone(),
        JupiterConfig {
            priority_fee_microlamports: 1_000,
            ..JupiterConfig::default()
        },
    );

    let overrides = TradeOverrides {
        slippage_bps: Some(250),
        priority_fee_microlamports: Some(7_777),
        tip_lamports: Some(5_000),
        ..TradeOverrides::default()
    };
    let result = exec
        .buy_with(&snapshot("MintA", 0.25), 50.0, overrides)
        .await
        .unwrap();
    assert_eq!(result.live.unwrap().slippage_bps, 250);

    let params = api.quote_params.lock().unwrap();
    let first: std::collections::HashMap<_, _> = params[0].iter().cloned().collect();
    assert_eq!(first["slippageBps"], "250");

    let requests = api.swap_requests.lock().unwrap();
    assert_eq!(requests[0]["computeUnitPriceMicroLamports"], 7_777);
    assert_eq!(requests[0]["prioritizationFeeLamports"], 5_000);
}

#[tokio::test]
async fn failed_presend_simulation_does_not_abort() {
    struct FailingSimRpc;

    #[async_trait]
    impl RpcTransport for FailingSimRpc {
        async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
            match method {
                "simulateTransaction" => Ok(json!({
                    "context": {"slot": 1},
                    "value": {"err": {"InstructionError": [0, "Custom"]}, "logs": []},
                })),
                "sendTransaction" => Ok(json!("live_sig_222")),
                other => Err(RpcError::InvalidResponse(format!("unexpected method {other}"))),
            }
        }
    }

    let api = ScriptedSwapApi::new(
        quote_with(vec![route("50000000", "200000000000")]),
        swap_tx(),
    );
    let exec = JupiterExecutor::new(
        api,
        Some(Arc::new(StaticSigner)),
        Some(Arc::new(RpcSender::with_transport(Arc::new(FailingSimRpc)))),
        JupiterConfig::default(),
    );

    let result = exec.buy(&snapshot("MintA", 0.25), 50.0).await.unwrap();
    assert_eq!(result.live.unwrap().signature, "live_sig_222");
}
