// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_registry::TokenDecimals;
use crate::encoding::{h256_hex, withdrawal_data_hash};
use crate::error::{GeneratorError, GeneratorResult};
use crate::networks::NetworkTable;
use crate::types::PendingTransaction;
use ethers::types::{U256, U512};
use std::sync::Arc;

/// A chain as the settlement check sees it
#[derive(Clone, Copy, Debug)]
pub struct ChainEndpoint<'a> {
    pub chain_id: &'a str,
    pub rpc_url: &'a str,
}

/// Parses a base-10 integer amount
pub fn parse_amount(value: &str) -> GeneratorResult<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GeneratorError::InvalidAmount(value.to_string()));
    }
    U256::from_dec_str(trimmed).map_err(|_| GeneratorError::InvalidAmount(value.to_string()))
}

fn scale(amount: U256, decimals: u8) -> GeneratorResult<U512> {
    U512::from(10u8)
        .checked_pow(U512::from(decimals))
        .and_then(|factor| U512::from(amount).checked_mul(factor))
        .ok_or_else(|| GeneratorError::InvalidAmount(format!("{} at {} decimals", amount, decimals)))
}

/// `settled / 10^settled_decimals >= requested / 10^requested_decimals`,
/// compared without division.
pub fn settlement_covers(
    requested: U256,
    requested_decimals: u8,
    settled: U256,
    settled_decimals: u8,
) -> GeneratorResult<bool> {
    Ok(scale(settled, requested_decimals)? >= scale(requested, settled_decimals)?)
}

pub struct SettlementValidator {
    networks: Arc<NetworkTable>,
    decimals: Arc<dyn TokenDecimals>,
}

impl SettlementValidator {
    pub fn new(networks: Arc<NetworkTable>, decimals: Arc<dyn TokenDecimals>) -> Self {
        Self { networks, decimals }
    }

    /// `requested_amount_in` is denominated in the destination foundry token,
    /// `settled_amount` in the source foundry token.
    pub async fn is_settlement_valid(
        &self,
        slippage: Option<f64>,
        source: &ChainEndpoint<'_>,
        destination: &ChainEndpoint<'_>,
        requested_amount_in: &str,
        settled_amount: &str,
    ) -> GeneratorResult<bool> {
        let requested = parse_amount(requested_amount_in)?;
        let settled = parse_amount(settled_amount)?;

        let source_token = self.networks.foundry_token(source.chain_id)?;
        let destination_token = self.networks.foundry_token(destination.chain_id)?;
        let source_decimals = self.decimals.decimals(source.rpc_url, source_token).await?;
        let destination_decimals = self
            .decimals
            .decimals(destination.rpc_url, destination_token)
            .await?;

        let valid = settlement_covers(requested, destination_decimals, settled, source_decimals)?;
        tracing::info!(
            "[SettlementValidator] {} -> {}: settled={} ({} dec), requested={} ({} dec), slippage={:?}, valid={}",
            source.chain_id,
            destination.chain_id,
            settled,
            source_decimals,
            requested,
            destination_decimals,
            slippage,
            valid
        );
        Ok(valid)
    }
}

/// Recomputes the swap fingerprint from the backend payload and compares it
/// with the one committed on the source chain.
pub fn check_withdrawal_data(
    tx: &PendingTransaction,
    on_chain_hash: Option<&str>,
) -> GeneratorResult<()> {
    let expected = withdrawal_data_hash(
        tx.source_one_inch_data.as_deref().unwrap_or_default(),
        tx.destination_one_inch_data.as_deref().unwrap_or_default(),
        tx.destination_amount_in.as_deref().unwrap_or_default(),
        tx.destination_amount_out.as_deref().unwrap_or_default(),
        tx.source_asset_type.as_deref().unwrap_or_default(),
        tx.destination_asset_type.as_deref().unwrap_or_default(),
    );
    let matches = on_chain_hash
        .map(|hash| hash.eq_ignore_ascii_case(&h256_hex(&expected)))
        .unwrap_or(false);
    if matches {
        Ok(())
    } else {
        tracing::warn!(
            "[SettlementValidator] withdrawalData mismatch for {}: on chain {:?}, computed {}",
            tx.receive_transaction_id,
            on_chain_hash,
            h256_hex(&expected)
        );
        Err(GeneratorError::WithdrawalDataMismatch)
    }
}
