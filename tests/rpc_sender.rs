//! Tests for the RPC transaction channel: retry policy, confirmation
//! polling and simulation reporting, over a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mintrunner::exec::senders::{RpcError, RpcSender};
use mintrunner::exec::{CommitmentLevel, RpcTransport};
use serde_json::{json, Value};

/// Transport that replays a scripted response per call and records the
/// methods invoked. When the script runs dry it returns a null signature
/// status, which keeps confirmation polls spinning.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, RpcError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<Value, RpcError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        self.calls.lock().unwrap().push(method.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"context": {"slot": 1}, "value": [null]})))
    }
}

#[tokio::test(start_paused = true)]
async fn transient_node_error_is_retried_then_succeeds() {
    let transport = ScriptedTransport::new(vec![
        Err(RpcError::Node {
            code: -32603,
            message: "internal error".into(),
        }),
        Ok(json!("5sig111")),
    ]);
    let sender = RpcSender::with_transport(transport.clone());

    let signature = sender.send("dGVzdA==", false, 3).await.unwrap();
    assert_eq!(signature, "5sig111");
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn deterministic_error_fails_immediately() {
    let transport = ScriptedTransport::new(vec![Err(RpcError::Node {
        code: -32602,
        message: "invalid params".into(),
    })]);
    let sender = RpcSender::with_transport(transport.clone());

    let err = sender.send("dGVzdA==", false, 3).await.unwrap_err();
    assert!(matches!(err, RpcError::Node { code: -32602, .. }));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded() {
    let persistent_failure = || {
        Err(RpcError::Node {
            code: -32005,
            message: "node is behind".into(),
        })
    };
    let transport = ScriptedTransport::new(vec![
        persistent_failure(),
        persistent_failure(),
        persistent_failure(),
        persistent_failure(),
    ]);
    let sender = RpcSender::with_transport(transport.clone());

    let err = sender.send("dGVzdA==", false, 3).await.unwrap_err();
    assert!(matches!(err, RpcError::Node { code: -32005, .. }));
    // First attempt plus two retries.
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn confirm_resolves_once_commitment_is_reached() {
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"context": {"slot": 1}, "value": [null]})),
        Ok(json!({"context": {"slot": 2}, "value": [{
            "slot": 2,
            "confirmations": 1,
            "err": null,
            "confirmationStatus": "processed",
        }]})),
        Ok(json!({"context": {"slot": 3}, "value": [{
            "slot": 3,
            "confirmations": 10,
            "err": null,
            "confirmationStatus": "confirmed",
        }]})),
    ]);
    let sender = RpcSender::with_transport(transport.clone());

    let status = sender
        .confirm_signature(
            "5sig111",
            CommitmentLevel::Confirmed,
            Duration::from_secs(30),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    assert_eq!(status.confirmation_status.as_deref(), Some("confirmed"));
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn stronger_commitment_satisfies_weaker_request() {
    let transport = ScriptedTransport::new(vec![Ok(json!({"context": {"slot": 3}, "value": [{
        "slot": 3,
        "confirmations": null,
        "err": null,
        "confirmationStatus": "finalized",
    }]}))]);
    let sender = RpcSender::with_transport(transport);

    let status = sender
        .confirm_signature(
            "5sig111",
            CommitmentLevel::Confirmed,
            Duration::from_secs(30),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    assert_eq!(status.confirmation_status.as_deref(), Some("finalized"));
}

#[tokio::test(start_paused = true)]
async fn on_chain_failure_is_terminal() {
    let transport = ScriptedTransport::new(vec![Ok(json!({"context": {"slot": 2}, "value": [{
        "slot": 2,
        "confirmations": 1,
        "err": {"InstructionError": [0, "Custom"]},
        "confirmationStatus": "confirmed",
    }]}))]);
    let sender = RpcSender::with_transport(transport.clone());

    let err = sender
        .confirm_signature(
            "5sig111",
            CommitmentLevel::Confirmed,
            Duration::from_secs(30),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::TransactionFailed(_)));
    // No further polling after a terminal failure.
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn confirm_times_out_distinctly() {
    // Script never produces a status; the default null entry keeps the
    // poll loop going until the deadline.
    let transport = ScriptedTransport::new(vec![]);
    let sender = RpcSender::with_transport(transport);

    let err = sender
        .confirm_signature(
            "5sig111",
            CommitmentLevel::Confirmed,
            Duration::from_secs(5),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::ConfirmTimeout(_)));
}

#[tokio::test(start_paused = true)]
async fn simulation_failure_is_data_not_error() {
    let transport = ScriptedTransport::new(vec![Ok(json!({"context": {"slot": 9}, "value": {
        "err": {"InstructionError": [2, {"Custom": 6001}]},
        "logs": ["Program log: Error: slippage exceeded"],
        "unitsConsumed": 48500,
    }}))]);
    let sender = RpcSender::with_transport(transport);

    let report = sender.simulate("dGVzdA==").await.unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.logs.len(), 1);
    assert_eq!(report.units_consumed, Some(48_500));
}

#[tokio::test(start_paused = true)]
async fn blockhash_parsing() {
    let transport = ScriptedTransport::new(vec![Ok(json!({"context": {"slot": 100}, "value": {
        "blockhash": "9yQ6hash",
        "lastValidBlockHeight": 12_345,
    }}))]);
    let sender = RpcSender::with_transport(transport);

    let info = sender
        .get_latest_blockhash(CommitmentLevel::Finalized)
        .await
        .unwrap();
    assert_eq!(info.blockhash, "9yQ6hash");
    assert_eq!(info.last_valid_block_height, 12_345);
}
