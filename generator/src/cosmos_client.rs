// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

// Read-only Tendermint RPC client for Cosmos source chains

use crate::error::{GeneratorError, GeneratorResult};
use crate::metrics::GeneratorMetrics;
use crate::receipt::SourceChainClient;
use crate::types::{ChainFamily, ChainReceipt, ChainReceiptBody, CosmosTxResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TendermintResponse {
    #[serde(default)]
    result: Option<TendermintTx>,
    #[serde(default)]
    error: Option<TendermintError>,
}

#[derive(Debug, Deserialize)]
struct TendermintError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TendermintTx {
    hash: String,
    // Tendermint encodes int64 as a JSON string
    #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
    height: u64,
    tx_result: TendermintTxResult,
}

#[derive(Debug, Deserialize)]
struct TendermintTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
}

/// `Ok(None)` when the node does not know the transaction yet
pub fn parse_tx_response(body: &str) -> GeneratorResult<Option<CosmosTxResult>> {
    let response: TendermintResponse = serde_json::from_str(body).map_err(|e| {
        GeneratorError::TransientProviderError(format!("unreadable /tx response: {}", e))
    })?;
    if let Some(error) = response.error {
        let detail = error.data.unwrap_or_default();
        if detail.to_lowercase().contains("not found")
            || error.message.to_lowercase().contains("not found")
        {
            return Ok(None);
        }
        return Err(GeneratorError::TransientProviderError(format!(
            "tendermint error {}: {} {}",
            error.code, error.message, detail
        )));
    }
    let Some(tx) = response.result else {
        return Ok(None);
    };
    Ok(Some(CosmosTxResult {
        hash: tx.hash,
        height: tx.height,
        code: tx.tx_result.code,
        raw_log: tx.tx_result.log,
    }))
}

fn normalize_hash(tx_id: &str) -> GeneratorResult<String> {
    let hash = tx_id
        .strip_prefix("0x")
        .or_else(|| tx_id.strip_prefix("0X"))
        .unwrap_or(tx_id);
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GeneratorError::InvalidTxHash(tx_id.to_string()));
    }
    Ok(hash.to_uppercase())
}

#[derive(Clone, Debug)]
pub struct CosmosClient {
    http_client: reqwest::Client,
    rpc_url: String,
    metrics: Arc<GeneratorMetrics>,
}

impl CosmosClient {
    pub fn new(rpc_url: impl Into<String>, metrics: Arc<GeneratorMetrics>) -> Self {
        fn shared_http_client() -> reqwest::Client {
            static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
            CLIENT
                .get_or_init(|| {
                    reqwest::Client::builder()
                        .connect_timeout(Duration::from_secs(2))
                        .timeout(Duration::from_secs(15))
                        .build()
                        .unwrap_or_else(|e| {
                            tracing::warn!("[CosmosClient] default http client in use: {}", e);
                            reqwest::Client::new()
                        })
                })
                .clone()
        }

        Self {
            http_client: shared_http_client(),
            rpc_url: rpc_url.into().trim_end_matches('/').to_string(),
            metrics,
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn query_tx(&self, hash: &str) -> GeneratorResult<Option<CosmosTxResult>> {
        let url = format!("{}/tx", self.rpc_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("hash", format!("0x{}", hash))])
            .send()
            .await
            .map_err(|e| GeneratorError::TransientProviderError(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::TransientProviderError(e.to_string()))?;
        // Unknown hashes come back as HTTP 500 with a JSON-RPC error body
        match parse_tx_response(&body) {
            Err(e) if !status.is_success() => Err(GeneratorError::TransientProviderError(
                format!("HTTP {} from {}: {:?}", status, url, e),
            )),
            other => other,
        }
    }
}

#[async_trait]
impl SourceChainClient for CosmosClient {
    fn family(&self) -> ChainFamily {
        ChainFamily::Cosmos
    }

    async fn fetch_receipt(&self, tx_id: &str) -> GeneratorResult<Option<ChainReceipt>> {
        let hash = normalize_hash(tx_id)?;
        let result = self.query_tx(&hash).await;
        let outcome = match &result {
            Ok(Some(_)) => "found",
            Ok(None) => "pending",
            Err(_) => "error",
        };
        self.metrics
            .cosmos_rpc_queries
            .with_label_values(&[outcome])
            .inc();
        let Some(tx) = result? else {
            return Ok(None);
        };
        tracing::debug!(
            "[CosmosClient] tx {} at height {} code {}",
            tx.hash,
            tx.height,
            tx.code
        );
        Ok(Some(ChainReceipt {
            status: tx.code == 0,
            transaction_hash: tx.hash.clone(),
            code: Some(tx.code),
            from: None,
            receipt: ChainReceiptBody::Cosmos(tx),
        }))
    }

    async fn transaction_details(
        &self,
        receipt: &ChainReceipt,
        from: Option<&str>,
    ) -> GeneratorResult<Value> {
        Ok(json!({ "hash": receipt.transaction_hash, "from": from }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_found_tx() {
        let body = r#"{
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "hash": "ABCDEF0123",
                "height": "4242",
                "index": 0,
                "tx_result": { "code": 0, "log": "[{\"events\":[]}]", "gas_used": "100" },
                "tx": "CpIBCo8B"
            }
        }"#;
        let tx = parse_tx_response(body).unwrap().unwrap();
        assert_eq!(tx.hash, "ABCDEF0123");
        assert_eq!(tx.height, 4242);
        assert_eq!(tx.code, 0);
        assert_eq!(tx.raw_log, "[{\"events\":[]}]");
    }

    #[test]
    fn test_not_found_is_pending() {
        let body = r#"{
            "jsonrpc": "2.0",
            "id": -1,
            "error": {
                "code": -32603,
                "message": "Internal error",
                "data": "tx (ABCDEF0123) not found"
            }
        }"#;
        assert_eq!(parse_tx_response(body).unwrap(), None);
    }

    #[test]
    fn test_other_errors_are_transient() {
        let body = r#"{"jsonrpc":"2.0","id":-1,"error":{"code":-32603,"message":"Internal error","data":"timed out"}}"#;
        assert!(matches!(
            parse_tx_response(body),
            Err(GeneratorError::TransientProviderError(_))
        ));
        assert!(matches!(
            parse_tx_response("<html>bad gateway</html>"),
            Err(GeneratorError::TransientProviderError(_))
        ));
    }

    #[test]
    fn test_normalize_hash() {
        assert_eq!(normalize_hash("0xabcdef").unwrap(), "ABCDEF");
        assert_eq!(normalize_hash("ABCDEF").unwrap(), "ABCDEF");
        assert!(matches!(
            normalize_hash("0xnothex"),
            Err(GeneratorError::InvalidTxHash(_))
        ));
        assert!(normalize_hash("").is_err());
    }

    #[tokio::test]
    async fn test_details_and_url() {
        let client = CosmosClient::new(
            "http://localhost:26657/",
            Arc::new(GeneratorMetrics::new_for_testing()),
        );
        assert_eq!(client.rpc_url(), "http://localhost:26657");
        let receipt = ChainReceipt {
            status: true,
            transaction_hash: "ABCDEF".to_string(),
            code: Some(0),
            from: None,
            receipt: ChainReceiptBody::Cosmos(CosmosTxResult {
                hash: "ABCDEF".to_string(),
                height: 1,
                code: 0,
                raw_log: "[]".to_string(),
            }),
        };
        let details = client
            .transaction_details(&receipt, Some("cudos1sender"))
            .await
            .unwrap();
        assert_eq!(details, json!({ "hash": "ABCDEF", "from": "cudos1sender" }));
    }
}
