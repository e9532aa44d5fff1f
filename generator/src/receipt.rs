// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{GeneratorError, GeneratorResult};
use crate::types::{ChainFamily, ChainReceipt};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read side of a source chain. One implementation per chain family.
#[async_trait]
pub trait SourceChainClient: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// `Ok(None)` while the transaction is unknown or not yet final
    async fn fetch_receipt(&self, tx_id: &str) -> GeneratorResult<Option<ChainReceipt>>;

    /// Transaction record reported to the backend next to the receipt
    async fn transaction_details(
        &self,
        receipt: &ChainReceipt,
        from: Option<&str>,
    ) -> GeneratorResult<serde_json::Value>;
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_interval_ms() -> u64 {
    1_000
}

fn default_max_interval_ms() -> u64 {
    15_000
}

fn default_max_elapsed_secs() -> u64 {
    120
}

/// Bounds for one receipt lookup. At most `max_retries + 1` attempts, all
/// within `max_elapsed_secs`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_secs: default_max_elapsed_secs(),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            current_interval: Duration::from_millis(self.initial_interval_ms),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed_time: Some(Duration::from_secs(self.max_elapsed_secs)),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReceiptOutcome {
    /// The chain reached a verdict; `status` may still be false
    Confirmed(ChainReceipt),
    /// No final receipt within the retry budget
    Exhausted { attempts: u32 },
    /// The lookup can never succeed, e.g. the id is not a transaction hash
    Rejected(GeneratorError),
}

pub async fn get_receipt(
    tx_id: &str,
    client: &dyn SourceChainClient,
    policy: &RetryPolicy,
) -> ReceiptOutcome {
    let mut backoff = policy.backoff();
    backoff.reset();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match client.fetch_receipt(tx_id).await {
            Ok(Some(receipt)) => {
                tracing::info!(
                    "[ReceiptReader] {} receipt for {} after {} attempt(s): status={}",
                    client.family().as_str(),
                    tx_id,
                    attempts,
                    receipt.status
                );
                return ReceiptOutcome::Confirmed(receipt);
            }
            Ok(None) => {
                tracing::debug!(
                    "[ReceiptReader] {} not final yet (attempt {})",
                    tx_id,
                    attempts
                );
            }
            Err(e @ GeneratorError::InvalidTxHash(_)) => {
                tracing::warn!("[ReceiptReader] Not retrying {}: {:?}", tx_id, e);
                return ReceiptOutcome::Rejected(e);
            }
            Err(e) => {
                tracing::warn!(
                    "[ReceiptReader] Error fetching receipt for {} (attempt {}): {:?}",
                    tx_id,
                    attempts,
                    e
                );
            }
        }
        if attempts > policy.max_retries {
            break;
        }
        match backoff.next_backoff() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => break,
        }
    }
    tracing::warn!(
        "[ReceiptReader] Giving up on {} after {} attempt(s)",
        tx_id,
        attempts
    );
    ReceiptOutcome::Exhausted { attempts }
}
