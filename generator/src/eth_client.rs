// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::sync::Arc;

use crate::abi::Erc20;
use crate::encoding::h256_hex;
use crate::error::{GeneratorError, GeneratorResult};
use crate::events::address_hex;
use crate::metered_eth_provider::{new_metered_eth_provider, MeteredEthHttpProvier};
use crate::metrics::GeneratorMetrics;
use crate::receipt::SourceChainClient;
use crate::types::{ChainFamily, ChainReceipt, ChainReceiptBody};
use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::{Address as EthAddress, TransactionReceipt, TxHash, U64};
use serde_json::json;
use tap::TapFallible;

#[cfg(test)]
use crate::eth_mock_provider::EthMockProvider;

pub struct EthClient<P> {
    provider: Arc<Provider<P>>,
}

impl EthClient<MeteredEthHttpProvier> {
    /// No request is made until the first lookup
    pub fn new(provider_url: &str, metrics: Arc<GeneratorMetrics>) -> GeneratorResult<Self> {
        let provider = new_metered_eth_provider(provider_url, metrics).map_err(|e| {
            GeneratorError::ProviderError(format!("invalid eth rpc url {}: {}", provider_url, e))
        })?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

#[cfg(test)]
impl EthClient<EthMockProvider> {
    pub fn new_mocked(provider: EthMockProvider) -> Self {
        Self {
            provider: Arc::new(Provider::new(provider)),
        }
    }
}

fn parse_tx_hash(tx_id: &str) -> GeneratorResult<TxHash> {
    TxHash::from_str(tx_id).map_err(|_| GeneratorError::InvalidTxHash(tx_id.to_string()))
}

// A receipt without a block number or status is still pending
fn normalize_receipt(receipt: TransactionReceipt) -> Option<ChainReceipt> {
    receipt.block_number?;
    let status = receipt.status?;
    Some(ChainReceipt {
        status: status == U64::from(1),
        transaction_hash: h256_hex(&receipt.transaction_hash),
        code: None,
        from: Some(address_hex(&receipt.from)),
        receipt: ChainReceiptBody::Evm(receipt),
    })
}

impl<P> EthClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub async fn get_chain_id(&self) -> GeneratorResult<u64> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| GeneratorError::TransientProviderError(e.to_string()))?;
        Ok(chain_id.as_u64())
    }

    /// ERC-20 `decimals()` of `token`
    pub async fn decimals(&self, token: EthAddress) -> GeneratorResult<u8> {
        let contract = Erc20::new(token, self.provider.clone());
        contract
            .decimals()
            .call()
            .await
            .map_err(|e| GeneratorError::ProviderError(format!("decimals() on {:?}: {}", token, e)))
            .tap_err(|e| tracing::warn!("[EthClient] {:?}", e))
    }
}

#[async_trait]
impl<P> SourceChainClient for EthClient<P>
where
    P: JsonRpcClient + 'static,
{
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn fetch_receipt(&self, tx_id: &str) -> GeneratorResult<Option<ChainReceipt>> {
        let tx_hash = parse_tx_hash(tx_id)?;
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| GeneratorError::TransientProviderError(e.to_string()))
            .tap_err(|e| {
                tracing::warn!(
                    "[EthClient] RPC error getting receipt: tx_hash={:?}, error={:?}",
                    tx_hash,
                    e
                )
            })?;
        let Some(receipt) = receipt else {
            tracing::debug!("[EthClient] Receipt not found: tx_hash={:?}", tx_hash);
            return Ok(None);
        };
        tracing::debug!(
            "[EthClient] Receipt found: tx_hash={:?}, block_num={:?}, status={:?}, logs_count={}",
            tx_hash,
            receipt.block_number,
            receipt.status,
            receipt.logs.len()
        );
        Ok(normalize_receipt(receipt))
    }

    async fn transaction_details(
        &self,
        receipt: &ChainReceipt,
        from: Option<&str>,
    ) -> GeneratorResult<serde_json::Value> {
        let fallback = json!({ "hash": receipt.transaction_hash, "from": from });
        let tx_hash = parse_tx_hash(&receipt.transaction_hash)?;
        match self.provider.get_transaction(tx_hash).await {
            Ok(Some(tx)) => Ok(serde_json::to_value(tx)?),
            Ok(None) => Ok(fallback),
            Err(e) => {
                tracing::warn!(
                    "[EthClient] Could not load transaction {:?}, reporting hash only: {:?}",
                    tx_hash,
                    e
                );
                Ok(fallback)
            }
        }
    }
}
