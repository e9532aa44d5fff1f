// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Deposit extraction from confirmed source receipts.
//!
//! EVM receipts carry an ABI-encoded `Swap` (EVM destination) or
//! `NonEvmSwap` (non-EVM destination) log. Cosmos receipts carry a JSON
//! `rawLog` whose first message's event attributes hold the same fields.

use crate::abi::{NonEvmSwapFilter, SwapFilter};
use crate::encoding::h256_hex;
use crate::error::{GeneratorError, GeneratorResult};
use crate::types::{ChainFamily, ChainReceipt, ChainReceiptBody, DecodedDeposit};
use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::types::{Address as EthAddress, Log, H256};
use serde::Deserialize;

pub fn address_hex(address: &EthAddress) -> String {
    format!("{:?}", address)
}

/// Per-transaction facts the receipt itself does not carry
#[derive(Clone, Copy, Debug)]
pub struct DecodeContext<'a> {
    /// Source chain id as the backend names it
    pub source_chain_id: &'a str,
    /// Selects `NonEvmSwap` over `Swap` on EVM sources
    pub destination_non_evm: bool,
    /// Suffix stripped from Cosmos amounts, e.g. `acudos`
    pub native_denom: &'a str,
}

pub trait DepositDecoder: Send + Sync {
    fn decode(
        &self,
        receipt: &ChainReceipt,
        ctx: &DecodeContext<'_>,
    ) -> GeneratorResult<DecodedDeposit>;
}

pub fn decoder_for(family: ChainFamily) -> &'static dyn DepositDecoder {
    match family {
        ChainFamily::Evm => &EvmDepositDecoder,
        ChainFamily::Cosmos => &CosmosDepositDecoder,
    }
}

pub struct EvmDepositDecoder;

impl EvmDepositDecoder {
    fn find_log<'a>(logs: &'a [Log], topic: H256) -> Option<&'a Log> {
        logs.iter().find(|log| log.topics.first() == Some(&topic))
    }
}

impl DepositDecoder for EvmDepositDecoder {
    fn decode(
        &self,
        receipt: &ChainReceipt,
        ctx: &DecodeContext<'_>,
    ) -> GeneratorResult<DecodedDeposit> {
        let ChainReceiptBody::Evm(evm_receipt) = &receipt.receipt else {
            return Err(GeneratorError::MalformedDeposit(
                "expected an EVM receipt".to_string(),
            ));
        };
        let topic = if ctx.destination_non_evm {
            NonEvmSwapFilter::signature()
        } else {
            SwapFilter::signature()
        };
        let log = Self::find_log(&evm_receipt.logs, topic).ok_or_else(|| {
            tracing::warn!(
                "[EventDecoder] No deposit event with topic {:?} in tx {}",
                topic,
                receipt.transaction_hash
            );
            GeneratorError::NoDepositEventInReceipt
        })?;
        let raw_log = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let from = Some(address_hex(&evm_receipt.from));

        let deposit = if ctx.destination_non_evm {
            let event = NonEvmSwapFilter::decode_log(&raw_log)
                .map_err(|e| GeneratorError::MalformedDeposit(e.to_string()))?;
            DecodedDeposit {
                source_token: Some(address_hex(&event.source_token)),
                source_amount: Some(event.source_amount.to_string()),
                source_chain_id: Some(event.source_chain_id.to_string()),
                target_chain_id: Some(event.target_chain_id),
                target_token: Some(event.target_token),
                target_address: Some(event.target_address),
                from,
                ..Default::default()
            }
        } else {
            let event = SwapFilter::decode_log(&raw_log)
                .map_err(|e| GeneratorError::MalformedDeposit(e.to_string()))?;
            DecodedDeposit {
                source_token: Some(address_hex(&event.source_token)),
                source_amount: Some(event.source_amount.to_string()),
                source_chain_id: Some(event.source_chain_id.to_string()),
                target_chain_id: Some(event.target_chain_id.to_string()),
                target_token: Some(address_hex(&event.target_token)),
                target_address: Some(address_hex(&event.target_address)),
                from,
                swap_bridge_amount: None,
                settled_amount: Some(event.settled_amount.to_string()),
                withdrawal_data_hash: Some(h256_hex(&H256(event.withdrawal_data))),
            }
        };
        tracing::info!(
            "[EventDecoder] Decoded EVM deposit: tx={}, target_chain={:?}, amount={:?}",
            receipt.transaction_hash,
            deposit.target_chain_id,
            deposit.source_amount
        );
        Ok(deposit)
    }
}

#[derive(Debug, Deserialize)]
struct CosmosLog {
    #[serde(default)]
    events: Vec<CosmosEvent>,
}

#[derive(Debug, Deserialize)]
struct CosmosEvent {
    #[serde(default)]
    attributes: Vec<CosmosAttribute>,
}

#[derive(Debug, Deserialize)]
struct CosmosAttribute {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

// First attribute with `key` across the first message's events
fn first_attribute(logs: &[CosmosLog], key: &str) -> Option<String> {
    logs.first()?
        .events
        .iter()
        .flat_map(|event| event.attributes.iter())
        .find(|attribute| attribute.key == key)
        .and_then(|attribute| attribute.value.clone())
}

pub struct CosmosDepositDecoder;

impl DepositDecoder for CosmosDepositDecoder {
    fn decode(
        &self,
        receipt: &ChainReceipt,
        ctx: &DecodeContext<'_>,
    ) -> GeneratorResult<DecodedDeposit> {
        let ChainReceiptBody::Cosmos(tx) = &receipt.receipt else {
            return Err(GeneratorError::MalformedDeposit(
                "expected a Cosmos receipt".to_string(),
            ));
        };
        let logs: Vec<CosmosLog> = serde_json::from_str(&tx.raw_log).map_err(|e| {
            GeneratorError::MalformedDeposit(format!("rawLog is not a log array: {}", e))
        })?;
        if logs.is_empty() {
            return Err(GeneratorError::NoDepositEventInReceipt);
        }
        let source_amount = first_attribute(&logs, "amount").map(|amount| {
            amount
                .strip_suffix(ctx.native_denom)
                .map(str::to_string)
                .unwrap_or(amount)
        });
        let deposit = DecodedDeposit {
            source_token: first_attribute(&logs, "token"),
            source_amount,
            source_chain_id: Some(ctx.source_chain_id.to_string()),
            target_chain_id: first_attribute(&logs, "target_chain_id"),
            target_token: first_attribute(&logs, "target_token"),
            target_address: first_attribute(&logs, "target_address"),
            from: first_attribute(&logs, "from"),
            swap_bridge_amount: first_attribute(&logs, "swap_bridge_amount"),
            settled_amount: first_attribute(&logs, "settled_amount"),
            withdrawal_data_hash: first_attribute(&logs, "withdrawal_data"),
        };
        tracing::info!(
            "[EventDecoder] Decoded Cosmos deposit: tx={}, target_chain={:?}, amount={:?}",
            receipt.transaction_hash,
            deposit.target_chain_id,
            deposit.source_amount
        );
        Ok(deposit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        cosmos_raw_log, cosmos_receipt, evm_receipt, non_evm_swap_log, swap_log, SwapLogFields,
        TEST_TX_HASH,
    };
    use ethers::types::U256;
    use std::str::FromStr;

    const EVM_CTX: DecodeContext<'static> = DecodeContext {
        source_chain_id: "56",
        destination_non_evm: false,
        native_denom: "acudos",
    };

    #[test]
    fn test_decode_swap_event() {
        let fields = SwapLogFields::sample();
        let receipt = evm_receipt(TEST_TX_HASH, 1, vec![Log::default(), swap_log(&fields)]);
        let deposit = decoder_for(ChainFamily::Evm)
            .decode(&receipt, &EVM_CTX)
            .unwrap();

        assert_eq!(deposit.source_amount.as_deref(), Some("1000"));
        assert_eq!(deposit.source_chain_id.as_deref(), Some("56"));
        assert_eq!(deposit.target_chain_id.as_deref(), Some("137"));
        assert_eq!(
            deposit.target_address,
            Some(address_hex(&fields.target_address))
        );
        assert_eq!(deposit.settled_amount.as_deref(), Some("990"));
        assert_eq!(
            deposit.withdrawal_data_hash,
            Some(h256_hex(&fields.withdrawal_data))
        );
        assert!(deposit.from.is_some());
        assert!(deposit.payout_target().is_ok());
    }

    #[test]
    fn test_decode_non_evm_swap_event() {
        let log = non_evm_swap_log(
            EthAddress::from_str("0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d").unwrap(),
            "acudos",
            U256::from(56),
            "cudos-1",
            U256::from(5000),
            "cudos1qyqszqgpqyqszqgpqyqszqgpqyqszqgp",
        );
        let receipt = evm_receipt(TEST_TX_HASH, 1, vec![log]);
        let ctx = DecodeContext {
            destination_non_evm: true,
            ..EVM_CTX
        };
        let deposit = EvmDepositDecoder.decode(&receipt, &ctx).unwrap();
        assert_eq!(deposit.target_chain_id.as_deref(), Some("cudos-1"));
        assert_eq!(deposit.target_token.as_deref(), Some("acudos"));
        assert_eq!(deposit.source_amount.as_deref(), Some("5000"));
        assert!(deposit.settled_amount.is_none());
    }

    #[test]
    fn test_event_selection_follows_destination_flag() {
        // A Swap log does not satisfy a non-EVM destination
        let receipt = evm_receipt(TEST_TX_HASH, 1, vec![swap_log(&SwapLogFields::sample())]);
        let ctx = DecodeContext {
            destination_non_evm: true,
            ..EVM_CTX
        };
        assert_eq!(
            EvmDepositDecoder.decode(&receipt, &ctx).unwrap_err(),
            GeneratorError::NoDepositEventInReceipt
        );
        let empty = evm_receipt(TEST_TX_HASH, 1, vec![]);
        assert_eq!(
            EvmDepositDecoder.decode(&empty, &EVM_CTX).unwrap_err(),
            GeneratorError::NoDepositEventInReceipt
        );
    }

    #[test]
    fn test_truncated_log_is_malformed() {
        let mut log = swap_log(&SwapLogFields::sample());
        log.data = log.data.0.slice(0..64).into();
        let receipt = evm_receipt(TEST_TX_HASH, 1, vec![log]);
        assert!(matches!(
            EvmDepositDecoder.decode(&receipt, &EVM_CTX),
            Err(GeneratorError::MalformedDeposit(_))
        ));
    }

    #[test]
    fn test_decode_cosmos_raw_log() {
        let raw_log = cosmos_raw_log(&[
            ("token", "acudos"),
            ("amount", "25000acudos"),
            ("target_chain_id", "56"),
            ("target_token", "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d"),
            ("target_address", "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"),
            ("from", "cudos1sender"),
            ("swap_bridge_amount", "24000"),
            // Later duplicates are ignored
            ("amount", "1acudos"),
        ]);
        let receipt = cosmos_receipt("ABCDEF0123", 0, &raw_log);
        let ctx = DecodeContext {
            source_chain_id: "cudos-1",
            destination_non_evm: false,
            native_denom: "acudos",
        };
        let deposit = decoder_for(ChainFamily::Cosmos)
            .decode(&receipt, &ctx)
            .unwrap();
        assert_eq!(deposit.source_amount.as_deref(), Some("25000"));
        assert_eq!(deposit.source_chain_id.as_deref(), Some("cudos-1"));
        assert_eq!(deposit.from.as_deref(), Some("cudos1sender"));
        assert_eq!(deposit.swap_bridge_amount.as_deref(), Some("24000"));
        assert!(deposit.settled_amount.is_none());
    }

    #[test]
    fn test_cosmos_missing_target_token_is_undefined() {
        let raw_log = cosmos_raw_log(&[
            ("amount", "10acudos"),
            ("target_chain_id", "56"),
            ("target_address", "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"),
        ]);
        let receipt = cosmos_receipt("ABCDEF0123", 0, &raw_log);
        let ctx = DecodeContext {
            source_chain_id: "cudos-1",
            destination_non_evm: false,
            native_denom: "acudos",
        };
        let deposit = CosmosDepositDecoder.decode(&receipt, &ctx).unwrap();
        assert!(deposit.target_token.is_none());
        assert!(matches!(
            deposit.payout_target(),
            Err(GeneratorError::MalformedDeposit(_))
        ));
    }

    #[test]
    fn test_cosmos_bad_raw_log() {
        let ctx = DecodeContext {
            source_chain_id: "cudos-1",
            destination_non_evm: false,
            native_denom: "acudos",
        };
        let receipt = cosmos_receipt("ABCDEF0123", 0, "out of gas");
        assert!(matches!(
            CosmosDepositDecoder.decode(&receipt, &ctx),
            Err(GeneratorError::MalformedDeposit(_))
        ));
        let receipt = cosmos_receipt("ABCDEF0123", 0, "[]");
        assert_eq!(
            CosmosDepositDecoder.decode(&receipt, &ctx).unwrap_err(),
            GeneratorError::NoDepositEventInReceipt
        );
    }
}
