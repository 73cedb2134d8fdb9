//! Sends broadcasts through a stubbed L1 node.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_consensus::{Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{hex, keccak256, Address, Bytes, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use op_deployer::{
    AlloyTxManager, BroadcastError, Broadcaster, KeyedBroadcaster, TxManager, TxManagerConfig,
};
use op_script::{Broadcast, BroadcastHook, BroadcastKind, CREATE2_DEPLOYER};
use serde_json::{json, Value};
use wiremock::{matchers::method, Mock, MockServer, Request, Respond, ResponseTemplate};

const DEPLOYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Mines every published transaction instantly. The transaction with nonce `revert_nonce`
/// reverts.
#[derive(Debug, Clone)]
struct StubL1 {
    revert_nonce: u64,
    published: Arc<Mutex<HashMap<B256, u64>>>,
}

impl StubL1 {
    fn result(&self, method: &str, params: &Value) -> Value {
        match method {
            "eth_chainId" => json!("0x7a69"),
            "eth_getTransactionCount" => json!("0x0"),
            "eth_maxPriorityFeePerGas" => json!("0x3b9aca00"),
            "eth_getBlockByNumber" => block_json(),
            "eth_sendRawTransaction" => {
                let raw = hex::decode(params[0].as_str().unwrap_or_default()).unwrap();
                let envelope = TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap();
                let hash = keccak256(&raw);
                self.published.lock().unwrap().insert(hash, envelope.nonce());
                json!(hash)
            }
            "eth_getTransactionReceipt" => {
                let hash: B256 = serde_json::from_value(params[0].clone()).unwrap();
                let nonce = self.published.lock().unwrap().get(&hash).copied();
                nonce.map_or(Value::Null, |nonce| receipt_json(hash, nonce != self.revert_nonce))
            }
            other => panic!("unexpected RPC method {other}"),
        }
    }
}

impl Respond for StubL1 {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let result = self.result(body["method"].as_str().unwrap(), &body["params"]);
        ResponseTemplate::new(200)
            .set_body_json(json!({"jsonrpc": "2.0", "id": body["id"], "result": result}))
    }
}

fn block_json() -> Value {
    json!({
        "hash": B256::repeat_byte(0x11),
        "parentHash": B256::ZERO,
        "sha3Uncles": B256::ZERO,
        "miner": Address::ZERO,
        "stateRoot": B256::ZERO,
        "transactionsRoot": B256::ZERO,
        "receiptsRoot": B256::ZERO,
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "number": "0x10",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": "0x0",
        "extraData": "0x",
        "mixHash": B256::ZERO,
        "nonce": "0x0000000000000000",
        "baseFeePerGas": "0x7",
        "uncles": [],
        "transactions": []
    })
}

fn receipt_json(hash: B256, success: bool) -> Value {
    json!({
        "type": "0x2",
        "status": if success { "0x1" } else { "0x0" },
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": B256::repeat_byte(0x22),
        "blockNumber": "0x11",
        "from": Address::ZERO,
        "to": null,
        "contractAddress": null,
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca07",
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256))
    })
}

fn broadcast(from: Address, nonce: u64, to: Option<Address>, input: &'static [u8]) -> Broadcast {
    let input = Bytes::from_static(input);
    Broadcast {
        from,
        to,
        id: Broadcast::compute_id(from, to, nonce, &input),
        input,
        value: U256::ZERO,
        gas_used: 30_000,
        kind: if to.is_some() { BroadcastKind::Call } else { BroadcastKind::Create },
        nonce,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reverted_transaction_is_the_only_error() {
    let server = MockServer::start().await;
    let stub = StubL1 { revert_nonce: 1, published: Arc::default() };
    Mock::given(method("POST")).respond_with(stub.clone()).mount(&server).await;

    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_http(server.uri().parse().unwrap())
        .erased();
    let signer: PrivateKeySigner = DEPLOYER_KEY.parse().unwrap();
    let config = TxManagerConfig {
        network_timeout: Duration::from_secs(5),
        tx_send_timeout: Duration::from_secs(5),
        tx_not_in_mempool_timeout: Duration::from_secs(5),
        receipt_query_interval: Duration::from_millis(10),
    };
    let txmgr = AlloyTxManager::new(provider, signer, config).await.unwrap();
    let from = txmgr.from();
    let broadcaster = KeyedBroadcaster::new(txmgr);
    broadcaster.hook(broadcast(from, 0, None, &[0x60, 0x00, 0x60, 0x00, 0xf3]));
    broadcaster.hook(broadcast(from, 1, Some(CREATE2_DEPLOYER), &[0xde, 0xad]));
    broadcaster.hook(broadcast(from, 2, Some(CREATE2_DEPLOYER), &[0xbe, 0xef]));

    let (results, res) = broadcaster.broadcast().await;
    assert_eq!(results.len(), 3);
    let errors = res.unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors.errors()[0],
        BroadcastError::Reverted { id, .. } if id == results[1].broadcast.id
    ));

    for index in [0, 2] {
        assert!(results[index].err.is_none(), "{:?}", results[index].err);
        let receipt = results[index].receipt.as_ref().unwrap();
        assert_eq!(receipt.transaction_hash, results[index].tx_hash);
    }

    let published = stub.published.lock().unwrap();
    let nonce_of = |index: usize| published[&results[index].tx_hash];
    assert_eq!([nonce_of(0), nonce_of(1), nonce_of(2)], [0, 1, 2]);
}
