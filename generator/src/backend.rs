// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{GeneratorError, GeneratorResult};
use crate::metrics::GeneratorMetrics;
use crate::types::{PendingTransaction, TransactionUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;

const OP_LIST_PENDING: &str = "list_pending";
const OP_UPDATE: &str = "update_transaction";

/// Backend that hands out pending transfers and records generator outcomes
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn pending_transactions(&self) -> GeneratorResult<Vec<PendingTransaction>>;

    async fn update_transaction(
        &self,
        tx_id: &str,
        update: &TransactionUpdate,
    ) -> GeneratorResult<()>;
}

fn default_pending_path() -> String {
    "/transactions/pending".to_string()
}

fn default_update_path() -> String {
    "/transactions/{id}".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_pending_path")]
    pub pending_path: String,
    /// `{id}` is replaced with the source transaction id
    #[serde(default = "default_update_path")]
    pub update_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    pub fn pending_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.pending_path)
    }

    pub fn update_url(&self, tx_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.update_path.replace("{id}", tx_id)
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PendingListBody {
    List(Vec<Value>),
    Wrapped { transactions: Vec<Value> },
}

/// Accepts a bare array or `{ "transactions": [...] }`. Entries that do not
/// parse are skipped so one bad record cannot block the rest.
pub fn parse_pending_list(body: &str) -> GeneratorResult<Vec<PendingTransaction>> {
    let entries = match serde_json::from_str::<PendingListBody>(body)
        .map_err(|e| GeneratorError::BackendError(format!("unreadable pending list: {}", e)))?
    {
        PendingListBody::List(entries) => entries,
        PendingListBody::Wrapped { transactions } => transactions,
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            serde_json::from_value::<PendingTransaction>(entry)
                .tap_err(|e| tracing::warn!("[Backend] Skipping malformed pending entry: {}", e))
                .ok()
        })
        .collect())
}

pub struct BackendClient {
    http_client: reqwest::Client,
    config: BackendConfig,
    api_key: String,
    metrics: Arc<GeneratorMetrics>,
}

impl BackendClient {
    pub fn new(
        config: BackendConfig,
        api_key: String,
        metrics: Arc<GeneratorMetrics>,
    ) -> GeneratorResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GeneratorError::InternalError(format!("backend http client: {}", e)))?;
        Ok(Self {
            http_client,
            config,
            api_key,
            metrics,
        })
    }

    fn record(&self, operation: &str, ok: bool) {
        self.metrics
            .backend_requests
            .with_label_values(&[operation])
            .inc();
        if !ok {
            self.metrics
                .err_backend_requests
                .with_label_values(&[operation])
                .inc();
        }
    }

    async fn read_body(response: reqwest::Response, url: &str) -> GeneratorResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::BackendError(e.to_string()))?;
        if !status.is_success() {
            return Err(GeneratorError::BackendError(format!(
                "HTTP {} from {}: {}",
                status, url, body
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl TransactionBackend for BackendClient {
    async fn pending_transactions(&self) -> GeneratorResult<Vec<PendingTransaction>> {
        let url = self.config.pending_url();
        let result = async {
            let response = self
                .http_client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| GeneratorError::BackendError(e.to_string()))?;
            let body = Self::read_body(response, &url).await?;
            parse_pending_list(&body)
        }
        .await;
        self.record(OP_LIST_PENDING, result.is_ok());
        result.tap_err(|e| tracing::error!("[Backend] Listing pending transactions failed: {:?}", e))
    }

    async fn update_transaction(
        &self,
        tx_id: &str,
        update: &TransactionUpdate,
    ) -> GeneratorResult<()> {
        let url = self.config.update_url(tx_id);
        let result = async {
            let response = self
                .http_client
                .patch(&url)
                .bearer_auth(&self.api_key)
                .json(update)
                .send()
                .await
                .map_err(|e| GeneratorError::BackendError(e.to_string()))?;
            Self::read_body(response, &url).await.map(|_| ())
        }
        .await;
        self.record(OP_UPDATE, result.is_ok());
        result.tap_err(|e| tracing::warn!("[Backend] Update of {} failed: {:?}", tx_id, e))
    }
}
