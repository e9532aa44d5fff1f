// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Resolves per-chain RPC clients from the endpoints pending transactions
//! carry. Clients are created on first use and reused afterwards.

use crate::cosmos_client::CosmosClient;
use crate::error::GeneratorResult;
use crate::eth_client::EthClient;
use crate::metered_eth_provider::MeteredEthHttpProvier;
use crate::metrics::GeneratorMetrics;
use crate::receipt::SourceChainClient;
use crate::types::ChainFamily;
use async_trait::async_trait;
use ethers::types::Address as EthAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub trait ChainClients: Send + Sync {
    fn source_client(
        &self,
        family: ChainFamily,
        rpc_url: &str,
    ) -> GeneratorResult<Arc<dyn SourceChainClient>>;
}

#[async_trait]
pub trait TokenDecimals: Send + Sync {
    async fn decimals(&self, rpc_url: &str, token: EthAddress) -> GeneratorResult<u8>;
}

pub struct ChainRegistry {
    metrics: Arc<GeneratorMetrics>,
    eth_clients: Mutex<HashMap<String, Arc<EthClient<MeteredEthHttpProvier>>>>,
    cosmos_clients: Mutex<HashMap<String, Arc<CosmosClient>>>,
    // Token decimals never change
    decimals_cache: Mutex<HashMap<(String, EthAddress), u8>>,
}

impl ChainRegistry {
    pub fn new(metrics: Arc<GeneratorMetrics>) -> Self {
        Self {
            metrics,
            eth_clients: Mutex::new(HashMap::new()),
            cosmos_clients: Mutex::new(HashMap::new()),
            decimals_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn eth_client(
        &self,
        rpc_url: &str,
    ) -> GeneratorResult<Arc<EthClient<MeteredEthHttpProvier>>> {
        let mut clients = self.eth_clients.lock();
        if let Some(client) = clients.get(rpc_url) {
            return Ok(client.clone());
        }
        tracing::info!("[ChainRegistry] New EVM client for {}", rpc_url);
        let client = Arc::new(EthClient::new(rpc_url, self.metrics.clone())?);
        clients.insert(rpc_url.to_string(), client.clone());
        Ok(client)
    }

    pub fn cosmos_client(&self, rpc_url: &str) -> Arc<CosmosClient> {
        self.cosmos_clients
            .lock()
            .entry(rpc_url.to_string())
            .or_insert_with(|| {
                tracing::info!("[ChainRegistry] New Cosmos client for {}", rpc_url);
                Arc::new(CosmosClient::new(rpc_url, self.metrics.clone()))
            })
            .clone()
    }
}

impl ChainClients for ChainRegistry {
    fn source_client(
        &self,
        family: ChainFamily,
        rpc_url: &str,
    ) -> GeneratorResult<Arc<dyn SourceChainClient>> {
        let client: Arc<dyn SourceChainClient> = match family {
            ChainFamily::Evm => self.eth_client(rpc_url)?,
            ChainFamily::Cosmos => self.cosmos_client(rpc_url),
        };
        Ok(client)
    }
}

#[async_trait]
impl TokenDecimals for ChainRegistry {
    async fn decimals(&self, rpc_url: &str, token: EthAddress) -> GeneratorResult<u8> {
        let key = (rpc_url.to_string(), token);
        let cached = self.decimals_cache.lock().get(&key).copied();
        if let Some(decimals) = cached {
            return Ok(decimals);
        }
        let decimals = self.eth_client(rpc_url)?.decimals(token).await?;
        self.decimals_cache.lock().insert(key, decimals);
        Ok(decimals)
    }
}
