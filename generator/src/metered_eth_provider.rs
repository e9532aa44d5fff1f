// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::metrics::GeneratorMetrics;
use ethers::providers::{Http, HttpClientError, JsonRpcClient, Provider};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use url::{ParseError, Url};

/// Concurrent requests per endpoint. Many pipelines can share one source chain.
const MAX_CONCURRENT_REQUESTS: usize = 4;

const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct MeteredEthHttpProvier {
    inner: Http,
    metrics: Arc<GeneratorMetrics>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

fn is_rate_limited(err: &HttpClientError) -> bool {
    // Some providers answer 429 with a non JSON-RPC body, which surfaces as a
    // deserialization error carrying the raw text
    let error_str = format!("{:?}", err).to_lowercase();
    error_str.contains("rate limit")
        || error_str.contains("429")
        || error_str.contains("too many requests")
        || error_str.contains("-32005")
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl JsonRpcClient for MeteredEthHttpProvier {
    type Error = HttpClientError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, HttpClientError> {
        // The semaphore is never closed; a failed acquire only skips throttling
        let _permit = self.semaphore.acquire().await.ok();

        self.metrics
            .eth_rpc_queries
            .with_label_values(&[method])
            .inc();
        let _guard = self
            .metrics
            .eth_rpc_queries_latency
            .with_label_values(&[method])
            .start_timer();

        let mut result = self.inner.request(method, &params).await;
        let mut retry_count = 0;
        while retry_count < MAX_RATE_LIMIT_RETRIES {
            match &result {
                Err(e) if is_rate_limited(e) => {}
                _ => break,
            }
            let backoff_duration = Duration::from_secs(1 << retry_count);
            tracing::warn!(
                "[EthProvider] Rate limited on {}, retrying after {:?} (attempt {}/{})",
                method,
                backoff_duration,
                retry_count + 1,
                MAX_RATE_LIMIT_RETRIES
            );
            tokio::time::sleep(backoff_duration).await;
            result = self.inner.request(method, &params).await;
            retry_count += 1;
        }

        match &result {
            Ok(_) => self.metrics.eth_node_connected.set(1),
            Err(_) => self.metrics.eth_node_connected.set(0),
        }
        result
    }
}

impl MeteredEthHttpProvier {
    pub fn new(url: impl Into<Url>, metrics: Arc<GeneratorMetrics>) -> Self {
        Self {
            inner: Http::new(url),
            metrics,
            semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        }
    }
}

pub fn new_metered_eth_provider(
    url: &str,
    metrics: Arc<GeneratorMetrics>,
) -> Result<Provider<MeteredEthHttpProvier>, ParseError> {
    let http_provider = MeteredEthHttpProvier::new(Url::parse(url)?, metrics);
    Ok(Provider::new(http_provider))
}
