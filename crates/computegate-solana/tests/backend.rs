use std::time::Duration;

use computegate_chain::{BackendTimeouts, ChainBackend, SigningCredential};
use computegate_solana::{Pubkey, SolanaBackend, SolanaConfig};
use computegate_types::{ChainErrorKind, Identity, TokenAmount};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BLOCKHASH: &str = "11111111111111111111111111111111";

fn holder() -> Identity {
    Identity::new(Pubkey::new([11; 32]).to_string())
}

fn backend(rpc_url: String) -> SolanaBackend {
    let mut config = SolanaConfig::new(rpc_url, Pubkey::new([22; 32]).to_string());
    config.timeouts = BackendTimeouts {
        rpc: Duration::from_secs(2),
        confirmation: Duration::from_millis(400),
        poll_interval: Duration::from_millis(50),
    };
    let credential = SigningCredential::from_bytes(vec![7; 32]).unwrap();
    SolanaBackend::new(config, credential).unwrap()
}

async fn respond(server: &MockServer, rpc_method: &str, body: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn result(server: &MockServer, rpc_method: &str, result: Value) {
    respond(server, rpc_method, json!({ "jsonrpc": "2.0", "id": 1, "result": result })).await;
}

async fn mount_blockhash(server: &MockServer) {
    result(
        server,
        "getLatestBlockhash",
        json!({
            "context": { "slot": 100 },
            "value": { "blockhash": BLOCKHASH, "lastValidBlockHeight": 200 }
        }),
    )
    .await;
}

async fn mount_send(server: &MockServer) {
    result(server, "sendTransaction", json!("reported-signature")).await;
}

#[tokio::test]
async fn test_balance_reads_confirmed_token_amount() {
    let server = MockServer::start().await;
    result(
        &server,
        "getTokenAccountBalance",
        json!({
            "context": { "slot": 100 },
            "value": { "amount": "5000000", "decimals": 6, "uiAmountString": "5" }
        }),
    )
    .await;

    let balance = backend(server.uri()).get_balance(&holder()).await.unwrap();
    assert_eq!(balance, TokenAmount::new(5_000_000));
}

#[tokio::test]
async fn test_missing_token_account_is_zero() {
    let server = MockServer::start().await;
    respond(
        &server,
        "getTokenAccountBalance",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param: could not find account" }
        }),
    )
    .await;

    let balance = backend(server.uri()).get_balance(&holder()).await.unwrap();
    assert_eq!(balance, TokenAmount::ZERO);
}

#[tokio::test]
async fn test_malformed_holder_never_reaches_the_network() {
    let server = MockServer::start().await;
    let backend = backend(server.uri());

    let err = backend
        .get_balance(&Identity::new("0xnot-a-solana-address"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::InvalidIdentity);

    let err = backend
        .charge(&Identity::new("short"), TokenAmount::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::InvalidIdentity);

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connectivity() {
    let err = backend("http://127.0.0.1:9".to_string())
        .get_balance(&holder())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::Connectivity);
}

#[tokio::test]
async fn test_charge_confirms_and_returns_receipt() {
    let server = MockServer::start().await;
    mount_blockhash(&server).await;
    mount_send(&server).await;
    result(
        &server,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 105 },
            "value": [{ "slot": 104, "confirmations": 0, "err": null, "confirmationStatus": "confirmed" }]
        }),
    )
    .await;

    let backend = backend(server.uri());
    let receipt = backend
        .charge(&holder(), TokenAmount::new(3_000_000))
        .await
        .unwrap();

    assert_eq!(receipt.amount, TokenAmount::new(3_000_000));
    assert_eq!(receipt.holder, holder());
    assert_eq!(&receipt.payee, backend.treasury());
    assert_eq!(receipt.slot, Some(104));
    let signature = bs58::decode(&receipt.transaction_id).into_vec().unwrap();
    assert_eq!(signature.len(), 64);
}

#[tokio::test]
async fn test_preflight_insufficient_funds() {
    let server = MockServer::start().await;
    mount_blockhash(&server).await;
    respond(
        &server,
        "sendTransaction",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1",
                "data": {
                    "err": { "InstructionError": [0, { "Custom": 1 }] },
                    "logs": ["Program log: Error: insufficient funds"]
                }
            }
        }),
    )
    .await;

    let err = backend(server.uri())
        .charge(&holder(), TokenAmount::new(6_000_000))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::InsufficientFunds);
}

#[tokio::test]
async fn test_on_chain_failure_is_classified() {
    let server = MockServer::start().await;
    mount_blockhash(&server).await;
    mount_send(&server).await;
    result(
        &server,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 105 },
            "value": [{
                "slot": 104,
                "confirmations": 0,
                "err": { "InstructionError": [0, { "Custom": 1 }] },
                "confirmationStatus": "confirmed"
            }]
        }),
    )
    .await;

    let err = backend(server.uri())
        .charge(&holder(), TokenAmount::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::InsufficientFunds);
}

#[tokio::test]
async fn test_unconfirmed_transfer_reports_signature() {
    let server = MockServer::start().await;
    mount_blockhash(&server).await;
    mount_send(&server).await;
    result(
        &server,
        "getSignatureStatuses",
        json!({ "context": { "slot": 105 }, "value": [null] }),
    )
    .await;
    result(&server, "getBlockHeight", json!(150)).await;

    let err = backend(server.uri())
        .charge(&holder(), TokenAmount::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::Confirmation);
    let signature = err.transaction_id().expect("signature carried");
    assert_eq!(bs58::decode(signature).into_vec().unwrap().len(), 64);
}

#[tokio::test]
async fn test_expired_blockhash_is_submission() {
    let server = MockServer::start().await;
    mount_blockhash(&server).await;
    mount_send(&server).await;
    result(
        &server,
        "getSignatureStatuses",
        json!({ "context": { "slot": 400 }, "value": [null] }),
    )
    .await;
    result(&server, "getBlockHeight", json!(201)).await;

    let err = backend(server.uri())
        .charge(&holder(), TokenAmount::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::Submission);
}

#[tokio::test]
async fn test_expiry_with_unreadable_status_is_ambiguous() {
    let server = MockServer::start().await;
    mount_blockhash(&server).await;
    mount_send(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getSignatureStatuses" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "context": { "slot": 400 }, "value": [null] }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getSignatureStatuses" })))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    result(&server, "getBlockHeight", json!(201)).await;

    let err = backend(server.uri())
        .charge(&holder(), TokenAmount::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::Confirmation);
    assert!(err.transaction_id().is_some());
}

#[tokio::test]
async fn test_amount_beyond_u64_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let err = backend(server.uri())
        .charge(&holder(), TokenAmount::new(u64::MAX as u128 + 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ChainErrorKind::Submission);
    assert!(server.received_requests().await.unwrap().is_empty());
}
