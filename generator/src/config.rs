// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::backend::BackendConfig;
use crate::crypto::{GeneratorAllowlist, GeneratorSigner, OperatorKey};
use crate::encoding::{PayoutDomain, DEFAULT_CONTRACT_NAME, DEFAULT_CONTRACT_VERSION};
use crate::events::address_hex;
use crate::networks::{builtin_networks, NetworkConfig, NetworkTable};
use crate::receipt::RetryPolicy;
use crate::scheduler::DEFAULT_POLL_INTERVAL;
use anyhow::{anyhow, bail};
use fiber_generator_config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_contract_name() -> String {
    DEFAULT_CONTRACT_NAME.to_string()
}

fn default_contract_version() -> String {
    DEFAULT_CONTRACT_VERSION.to_string()
}

fn default_operator_key_env() -> String {
    "GENERATOR_OPERATOR_KEY".to_string()
}

fn default_api_key_env() -> String {
    "GENERATOR_API_KEY".to_string()
}

fn default_generator_addresses_env() -> String {
    "GENERATOR_ADDRESSES".to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneratorNodeConfig {
    // The port that the server listens on.
    pub server_listen_port: u16,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    // Bounds for source receipt lookups
    #[serde(default)]
    pub receipt_retry: RetryPolicy,
    pub backend: BackendConfig,
    // EIP-712 domain name and version of the fund manager contracts
    #[serde(default = "default_contract_name")]
    pub contract_name: String,
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    // Secrets are never stored in this file, only the variables holding them.
    #[serde(default = "default_operator_key_env")]
    pub operator_key_env: String,
    // Takes precedence over `operator-key-env` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_key_path: Option<PathBuf>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generator_addresses_env")]
    pub generator_addresses_env: String,
    #[serde(default = "builtin_networks")]
    pub networks: Vec<NetworkConfig>,
}

impl Config for GeneratorNodeConfig {}

impl GeneratorNodeConfig {
    pub fn validate(&self) -> anyhow::Result<GeneratorServerConfig> {
        self.validate_with_env(|name| std::env::var(name).ok())
    }

    /// Resolves secrets through `env` and checks the static parts of the file.
    pub fn validate_with_env(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<GeneratorServerConfig> {
        info!("Starting config validation");
        if self.poll_interval_secs == 0 {
            bail!("poll-interval-secs must be positive");
        }
        url::Url::parse(&self.backend.base_url)
            .map_err(|e| anyhow!("Invalid backend base-url {}: {}", self.backend.base_url, e))?;

        let mut seen = HashSet::new();
        for network in &self.networks {
            if !seen.insert(network.chain_id.as_str()) {
                bail!("Duplicate network row for chain {}", network.chain_id);
            }
        }

        let key = match &self.operator_key_path {
            Some(path) => OperatorKey::from_file(path)
                .map_err(|e| anyhow!("Failed to read operator key from {:?}: {:?}", path, e))?,
            None => {
                let value = env(&self.operator_key_env).ok_or_else(|| {
                    anyhow!(
                        "Operator key not found: set {} or operator-key-path",
                        self.operator_key_env
                    )
                })?;
                OperatorKey::from_hex(&value).map_err(|e| {
                    anyhow!("Invalid operator key in {}: {:?}", self.operator_key_env, e)
                })?
            }
        };
        let address = key
            .address()
            .map_err(|e| anyhow!("Invalid operator key: {:?}", e))?;

        let api_key = env(&self.api_key_env)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("API key not found: set {}", self.api_key_env))?;

        let allowlist = match env(&self.generator_addresses_env) {
            Some(value) if !value.trim().is_empty() => GeneratorAllowlist::parse(&value)
                .map_err(|e| {
                    anyhow!(
                        "Invalid generator allowlist in {}: {:?}",
                        self.generator_addresses_env,
                        e
                    )
                })?,
            _ => {
                warn!(
                    "{} not set, accepting only this node's signatures",
                    self.generator_addresses_env
                );
                GeneratorAllowlist::single(address)
            }
        };
        if !allowlist.contains(&address) {
            warn!(
                "Generator address {} is not in the allowlist",
                address_hex(&address)
            );
        }

        let signer = GeneratorSigner::new(key, allowlist)
            .map_err(|e| anyhow!("Invalid operator key: {:?}", e))?;
        info!(
            "Config validation complete, generator address {}",
            address_hex(&signer.address())
        );
        Ok(GeneratorServerConfig {
            signer,
            api_key,
            server_listen_port: self.server_listen_port,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            receipt_retry: self.receipt_retry.clone(),
            backend: self.backend.clone(),
            domain: PayoutDomain::new(&self.contract_name, &self.contract_version),
            networks: NetworkTable::new(self.networks.clone()),
        })
    }
}

pub struct GeneratorServerConfig {
    pub signer: GeneratorSigner,
    pub api_key: String,
    pub server_listen_port: u16,
    pub poll_interval: Duration,
    pub receipt_retry: RetryPolicy,
    pub backend: BackendConfig,
    pub domain: PayoutDomain,
    pub networks: NetworkTable,
}
