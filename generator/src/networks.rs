// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static per-chain contract table.
//!
//! Each supported chain has one row naming the fund manager (verifying
//! contract for payout signatures), the fiber router (secondary payee) and
//! the foundry token paid out on that chain. Rows are looked up by the
//! decimal chain id string the backend and the deposit events carry.

use crate::error::{GeneratorError, GeneratorResult};
use ethers::types::{Address as EthAddress, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const COSMOS_CHAIN_ID: &str = "cudos-1";
pub const COSMOS_NATIVE_DENOM: &str = "acudos";

fn default_withdraw_with_expiry() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    pub chain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_manager_address: Option<EthAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber_router_address: Option<EthAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foundry_token_address: Option<EthAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_router_address: Option<EthAddress>,
    // Fallback RPC endpoint when the pending transaction does not carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    // Denomination suffix stripped from Cosmos deposit amounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_denom: Option<String>,
    // Direct-asset payouts on chains without expiry support use the legacy typehash
    #[serde(default = "default_withdraw_with_expiry")]
    pub withdraw_with_expiry: bool,
}

impl NetworkConfig {
    fn evm(chain_id: &str, fund_manager: &str, fiber_router: &str, foundry_token: &str) -> Self {
        // unwrap: the built-in rows are valid checksummed literals
        let parse = |s: &str| EthAddress::from_str(s).unwrap();
        Self {
            chain_id: chain_id.to_string(),
            fund_manager_address: Some(parse(fund_manager)),
            fiber_router_address: Some(parse(fiber_router)),
            foundry_token_address: Some(parse(foundry_token)),
            aggregate_router_address: None,
            rpc_url: None,
            native_denom: None,
            withdraw_with_expiry: true,
        }
    }

    fn cosmos(chain_id: &str, denom: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            fund_manager_address: None,
            fiber_router_address: None,
            foundry_token_address: None,
            aggregate_router_address: None,
            rpc_url: None,
            native_denom: Some(denom.to_string()),
            withdraw_with_expiry: true,
        }
    }
}

/// Immutable after startup; shared behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkTable {
    networks: Vec<NetworkConfig>,
}

impl NetworkTable {
    pub fn new(networks: Vec<NetworkConfig>) -> Self {
        Self { networks }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_networks())
    }

    pub fn networks(&self) -> &[NetworkConfig] {
        &self.networks
    }

    pub fn get(&self, chain_id: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn require(&self, chain_id: &str) -> GeneratorResult<&NetworkConfig> {
        self.get(chain_id)
            .ok_or_else(|| GeneratorError::UnknownNetwork(chain_id.to_string()))
    }

    pub fn fund_manager(&self, chain_id: &str) -> GeneratorResult<EthAddress> {
        self.require(chain_id)?
            .fund_manager_address
            .ok_or_else(|| missing_field(chain_id, "fund manager"))
    }

    pub fn fiber_router(&self, chain_id: &str) -> GeneratorResult<EthAddress> {
        self.require(chain_id)?
            .fiber_router_address
            .ok_or_else(|| missing_field(chain_id, "fiber router"))
    }

    pub fn foundry_token(&self, chain_id: &str) -> GeneratorResult<EthAddress> {
        self.require(chain_id)?
            .foundry_token_address
            .ok_or_else(|| missing_field(chain_id, "foundry token"))
    }

    pub fn withdraw_with_expiry(&self, chain_id: &str) -> bool {
        self.get(chain_id)
            .map(|n| n.withdraw_with_expiry)
            .unwrap_or(true)
    }

    pub fn rpc_url(&self, chain_id: &str) -> Option<&str> {
        self.get(chain_id).and_then(|n| n.rpc_url.as_deref())
    }

    pub fn native_denom(&self, chain_id: &str) -> &str {
        self.get(chain_id)
            .and_then(|n| n.native_denom.as_deref())
            .unwrap_or(COSMOS_NATIVE_DENOM)
    }
}

impl Default for NetworkTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn missing_field(chain_id: &str, field: &str) -> GeneratorError {
    GeneratorError::UnknownNetwork(format!("{} has no {} configured", chain_id, field))
}

/// Parses a decimal chain id as carried by deposits and the backend.
pub fn parse_evm_chain_id(chain_id: &str) -> GeneratorResult<U256> {
    U256::from_dec_str(chain_id.trim())
        .map_err(|_| GeneratorError::UnknownNetwork(chain_id.to_string()))
}

pub fn builtin_networks() -> Vec<NetworkConfig> {
    vec![
        NetworkConfig::evm(
            "56",
            "0x6EBED6276033A33b6C6d60e515BF18E979976668",
            "0xd66C6a8277B4E258b4B6023F5B4085af00AfA9bB",
            "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
        ),
        NetworkConfig::evm(
            "250",
            "0x354CBFc2894d45a584a9Fd0223cf58495cE3cF7F",
            "0xAA209557B51C28a8D050fB500e67498EB3d1d92b",
            "0x04068DA6C83AFCFA0e13ba15A6696662335D5B75",
        ),
        NetworkConfig::evm(
            "137",
            "0xe54B5835e8aba22D52BF892b23Bb491E0bB1b579",
            "0x704D29c86fD1347446c5F30f80E77B31Dc67539f",
            "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174",
        ),
        NetworkConfig::evm(
            "42161",
            "0xcfddF60db000D49d0F2dafd7eDB08Fca177F1A1E",
            "0x0d618f4632C135e05d9fD795bab021e7DD3187c4",
            "0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8",
        ),
        NetworkConfig::evm(
            "43114",
            "0x81A536479Af0FE02Ec2aC6BB59Db305aa72a774f",
            "0x066599eD3abB7Eaf517119d376254af13871e5B1",
            "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
        ),
        NetworkConfig::evm(
            "245022934",
            "0xE6ff690CC7B91A2B626F7A76Fe507028bc1Eb12D",
            "0x2234157B16637AfA6f1A7C1C34b1b80D82b50D82",
            "0xea6b04272f9f62f997f666f07d3a974134f7ffb9",
        ),
        NetworkConfig::cosmos(COSMOS_CHAIN_ID, COSMOS_NATIVE_DENOM),
    ]
}
