// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::abi::{NonEvmSwapFilter, SwapFilter};
use crate::backend::TransactionBackend;
use crate::chain_registry::{ChainClients, TokenDecimals};
use crate::crypto::OperatorKey;
use crate::error::{GeneratorError, GeneratorResult};
use crate::events::address_hex;
use crate::networks::NetworkTable;
use crate::receipt::SourceChainClient;
use crate::types::{
    ChainFamily, ChainReceipt, ChainReceiptBody, CosmosTxResult, FiberInformation, NetworkInfo,
    PendingTransaction, TransactionUpdate,
};
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::contract::EthEvent;
use ethers::types::{Address as EthAddress, Log, TransactionReceipt, TxHash, H256, U256, U64};
use ethers::utils::keccak256;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

pub const TEST_TX_HASH: &str =
    "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

// Well-known local development accounts
pub const TEST_OPERATOR_KEY_HEX: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const TEST_OPERATOR_ADDRESS: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const TEST_PEER_KEY_HEX: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_PEER_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub const TEST_SOURCE_RPC: &str = "http://bsc.test";
pub const TEST_DESTINATION_RPC: &str = "http://polygon.test";
pub const TEST_COSMOS_RPC: &str = "http://cudos.test";
pub const TEST_TARGET_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";
pub const TEST_SENDER_ADDRESS: &str = "0x90F79bf6EB2c4f870365E785982E1f101E93b906";

pub fn init_for_testing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn test_operator_key() -> OperatorKey {
    OperatorKey::from_hex(TEST_OPERATOR_KEY_HEX).unwrap()
}

pub fn test_peer_key() -> OperatorKey {
    OperatorKey::from_hex(TEST_PEER_KEY_HEX).unwrap()
}

pub fn eth_address(value: &str) -> EthAddress {
    EthAddress::from_str(value).unwrap()
}

pub fn evm_receipt(tx_hash: &str, status: u64, logs: Vec<Log>) -> ChainReceipt {
    let receipt = TransactionReceipt {
        transaction_hash: TxHash::from_str(tx_hash).unwrap(),
        block_number: Some(U64::from(1_000)),
        status: Some(U64::from(status)),
        from: eth_address(TEST_SENDER_ADDRESS),
        logs,
        ..Default::default()
    };
    ChainReceipt {
        status: status == 1,
        transaction_hash: tx_hash.to_lowercase(),
        code: None,
        from: Some(address_hex(&receipt.from)),
        receipt: ChainReceiptBody::Evm(receipt),
    }
}

/// Non-indexed fields of a `Swap` log
#[derive(Clone, Debug)]
pub struct SwapLogFields {
    pub source_token: EthAddress,
    pub target_token: EthAddress,
    pub source_chain_id: U256,
    pub target_chain_id: U256,
    pub source_amount: U256,
    pub source_address: EthAddress,
    pub target_address: EthAddress,
    pub settled_amount: U256,
    pub withdrawal_data: H256,
}

impl SwapLogFields {
    /// 1000 foundry tokens from chain 56 to chain 137
    pub fn sample() -> Self {
        let networks = NetworkTable::builtin();
        Self {
            source_token: networks.foundry_token("56").unwrap(),
            target_token: networks.foundry_token("137").unwrap(),
            source_chain_id: U256::from(56),
            target_chain_id: U256::from(137),
            source_amount: U256::from(1000),
            source_address: eth_address(TEST_SENDER_ADDRESS),
            target_address: eth_address(TEST_TARGET_ADDRESS),
            settled_amount: U256::from(990),
            withdrawal_data: H256(keccak256(b"withdrawal")),
        }
    }
}

pub fn swap_log(fields: &SwapLogFields) -> Log {
    let data = encode(&[
        Token::Address(fields.source_token),
        Token::Address(fields.target_token),
        Token::Uint(fields.source_chain_id),
        Token::Uint(fields.target_chain_id),
        Token::Uint(fields.source_amount),
        Token::Address(fields.source_address),
        Token::Address(fields.target_address),
        Token::Uint(fields.settled_amount),
        Token::FixedBytes(fields.withdrawal_data.as_bytes().to_vec()),
    ]);
    Log {
        address: NetworkTable::builtin().fiber_router("56").unwrap(),
        topics: vec![SwapFilter::signature()],
        data: data.into(),
        ..Default::default()
    }
}

pub fn non_evm_swap_log(
    source_token: EthAddress,
    target_token: &str,
    source_chain_id: U256,
    target_chain_id: &str,
    amount: U256,
    target_address: &str,
) -> Log {
    let data = encode(&[
        Token::Address(source_token),
        Token::String(target_token.to_string()),
        Token::Uint(source_chain_id),
        Token::String(target_chain_id.to_string()),
        Token::Uint(amount),
        Token::Address(eth_address(TEST_SENDER_ADDRESS)),
        Token::String(target_address.to_string()),
    ]);
    Log {
        topics: vec![NonEvmSwapFilter::signature()],
        data: data.into(),
        ..Default::default()
    }
}

/// `rawLog` with one message whose single event carries `attributes`
pub fn cosmos_raw_log(attributes: &[(&str, &str)]) -> String {
    let attributes: Vec<Value> = attributes
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    json!([{
        "msg_index": 0,
        "events": [
            { "type": "message", "attributes": [] },
            { "type": "wasm", "attributes": attributes }
        ]
    }])
    .to_string()
}

pub fn cosmos_receipt(hash: &str, code: u32, raw_log: &str) -> ChainReceipt {
    ChainReceipt {
        status: code == 0,
        transaction_hash: hash.to_string(),
        code: Some(code),
        from: None,
        receipt: ChainReceiptBody::Cosmos(CosmosTxResult {
            hash: hash.to_string(),
            height: 42,
            code,
            raw_log: raw_log.to_string(),
        }),
    }
}

fn network(chain_id: &str, is_non_evm: bool, rpc_url: &str) -> NetworkInfo {
    NetworkInfo {
        chain_id: chain_id.to_string(),
        is_non_evm,
        fiber_information: FiberInformation {
            rpc_url: Some(rpc_url.to_string()),
        },
    }
}

/// EVM 56 to EVM 137 direct-asset transfer without peer signatures
pub fn sample_pending_transaction() -> PendingTransaction {
    PendingTransaction {
        receive_transaction_id: TEST_TX_HASH.to_string(),
        source_network: network("56", false, TEST_SOURCE_RPC),
        destination_network: network("137", false, TEST_DESTINATION_RPC),
        bridge_amount: Some("1000".to_string()),
        source_asset_type: Some("Foundary".to_string()),
        destination_asset_type: Some("Foundary".to_string()),
        expiry: Some(1_700_000_000),
        slippage: Some(0.5),
        source_one_inch_data: None,
        destination_one_inch_data: None,
        destination_amount_in: Some("990".to_string()),
        destination_amount_out: None,
        generator_sig: None,
    }
}

/// Cosmos to EVM 56 transfer
pub fn sample_cosmos_pending_transaction(tx_hash: &str) -> PendingTransaction {
    PendingTransaction {
        receive_transaction_id: tx_hash.to_string(),
        source_network: network("cudos-1", true, TEST_COSMOS_RPC),
        destination_network: network("56", false, TEST_SOURCE_RPC),
        destination_amount_in: None,
        ..sample_pending_transaction()
    }
}

/// Answers receipt lookups from a queue; an empty queue means "not final"
pub struct MockSourceClient {
    family: ChainFamily,
    receipts: Mutex<VecDeque<GeneratorResult<Option<ChainReceipt>>>>,
    calls: AtomicUsize,
}

impl MockSourceClient {
    pub fn new(family: ChainFamily) -> Self {
        Self {
            family,
            receipts: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: GeneratorResult<Option<ChainReceipt>>) {
        self.receipts.lock().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceChainClient for MockSourceClient {
    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn fetch_receipt(&self, _tx_id: &str) -> GeneratorResult<Option<ChainReceipt>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.receipts.lock().pop_front().unwrap_or(Ok(None))
    }

    async fn transaction_details(
        &self,
        receipt: &ChainReceipt,
        from: Option<&str>,
    ) -> GeneratorResult<Value> {
        Ok(json!({ "hash": receipt.transaction_hash, "from": from }))
    }
}

#[derive(Default)]
pub struct MockChainClients {
    clients: Mutex<HashMap<String, Arc<MockSourceClient>>>,
}

impl MockChainClients {
    pub fn register(&self, rpc_url: &str, client: Arc<MockSourceClient>) {
        self.clients.lock().insert(rpc_url.to_string(), client);
    }
}

impl ChainClients for MockChainClients {
    fn source_client(
        &self,
        family: ChainFamily,
        rpc_url: &str,
    ) -> GeneratorResult<Arc<dyn SourceChainClient>> {
        let client = self
            .clients
            .lock()
            .get(rpc_url)
            .cloned()
            .ok_or_else(|| GeneratorError::ProviderError(format!("no client for {}", rpc_url)))?;
        assert_eq!(client.family(), family, "family mismatch for {}", rpc_url);
        let client: Arc<dyn SourceChainClient> = client;
        Ok(client)
    }
}

#[derive(Default)]
pub struct MockTokenDecimals {
    decimals: Mutex<HashMap<(String, EthAddress), u8>>,
}

impl MockTokenDecimals {
    pub fn set(&self, rpc_url: &str, token: EthAddress, decimals: u8) {
        self.decimals
            .lock()
            .insert((rpc_url.to_string(), token), decimals);
    }
}

#[async_trait]
impl TokenDecimals for MockTokenDecimals {
    async fn decimals(&self, rpc_url: &str, token: EthAddress) -> GeneratorResult<u8> {
        self.decimals
            .lock()
            .get(&(rpc_url.to_string(), token))
            .copied()
            .ok_or_else(|| {
                GeneratorError::ProviderError(format!("no decimals for {:?} at {}", token, rpc_url))
            })
    }
}

/// In-memory backend recording every update it receives
#[derive(Default)]
pub struct MockBackend {
    pending: Mutex<Vec<PendingTransaction>>,
    updates: Mutex<Vec<(String, TransactionUpdate)>>,
    failing_updates: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MockBackend {
    pub fn set_pending(&self, transactions: Vec<PendingTransaction>) {
        *self.pending.lock() = transactions;
    }

    pub fn updates(&self) -> Vec<(String, TransactionUpdate)> {
        self.updates.lock().clone()
    }

    /// The next `count` updates fail before reaching the store
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionBackend for MockBackend {
    async fn pending_transactions(&self) -> GeneratorResult<Vec<PendingTransaction>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pending.lock().clone())
    }

    async fn update_transaction(
        &self,
        tx_id: &str,
        update: &TransactionUpdate,
    ) -> GeneratorResult<()> {
        let failing = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GeneratorError::BackendError("HTTP 503".to_string()));
        }
        self.updates
            .lock()
            .push((tx_id.to_string(), update.clone()));
        Ok(())
    }
}
