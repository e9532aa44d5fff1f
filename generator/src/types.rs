// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{GeneratorError, GeneratorResult};
use ethers::types::TransactionReceipt;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

pub const FOUNDARY: &str = "Foundary";
pub const ONE_INCH: &str = "1Inch";

/// Chain family of one side of a transfer, selected once per transaction
/// from the backend's `isNonEVM` flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Evm,
    Cosmos,
}

impl ChainFamily {
    pub fn from_non_evm_flag(is_non_evm: bool) -> Self {
        if is_non_evm {
            ChainFamily::Cosmos
        } else {
            ChainFamily::Evm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Cosmos => "cosmos",
        }
    }
}

/// Payout scheme on an EVM destination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationAssetType {
    /// Direct foundry-token payout (`WithdrawSigned`)
    Foundary,
    /// Swap-aggregator payout (`WithdrawSignedOneInch`)
    OneInch,
}

impl DestinationAssetType {
    pub fn parse(value: Option<&str>) -> GeneratorResult<Self> {
        match value {
            Some(FOUNDARY) => Ok(Self::Foundary),
            Some(ONE_INCH) => Ok(Self::OneInch),
            Some(other) => Err(GeneratorError::UnsupportedAssetType(other.to_string())),
            None => Err(GeneratorError::UnsupportedAssetType(
                "<missing>".to_string(),
            )),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberInformation {
    #[serde(default)]
    pub rpc_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub chain_id: String,
    #[serde(default, rename = "isNonEVM")]
    pub is_non_evm: bool,
    #[serde(default, rename = "multiswapNetworkFIBERInformation")]
    pub fiber_information: FiberInformation,
}

impl NetworkInfo {
    pub fn family(&self) -> ChainFamily {
        ChainFamily::from_non_evm_flag(self.is_non_evm)
    }

    pub fn rpc_url(&self) -> Option<&str> {
        self.fiber_information
            .rpc_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeerSignature {
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Signatures attached by the generator that handled the transaction first
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratorSig {
    #[serde(default)]
    pub signatures: Vec<PeerSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

/// A bridge transfer the backend wants attested.
///
/// `receive_transaction_id` is the source-chain transaction hash and the
/// identity used for de-duplication.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub receive_transaction_id: String,
    pub source_network: NetworkInfo,
    pub destination_network: NetworkInfo,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub bridge_amount: Option<String>,
    #[serde(default)]
    pub source_asset_type: Option<String>,
    #[serde(default)]
    pub destination_asset_type: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub expiry: Option<u64>,
    // Informational only, see SettlementValidator
    #[serde(default)]
    pub slippage: Option<f64>,
    #[serde(default)]
    pub source_one_inch_data: Option<String>,
    #[serde(default)]
    pub destination_one_inch_data: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub destination_amount_in: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub destination_amount_out: Option<String>,
    #[serde(default)]
    pub generator_sig: Option<GeneratorSig>,
}

impl PendingTransaction {
    pub fn is_source_non_evm(&self) -> bool {
        self.source_network.is_non_evm
    }

    pub fn is_destination_non_evm(&self) -> bool {
        self.destination_network.is_non_evm
    }

    /// Backend salt appended to this node's own signing salt
    pub fn peer_salt(&self) -> Option<&str> {
        self.generator_sig
            .as_ref()
            .and_then(|sig| sig.salt.as_deref())
            .filter(|salt| !salt.is_empty())
    }
}

/// Cosmos transaction as returned by the Tendermint `/tx` endpoint
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmosTxResult {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub raw_log: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChainReceiptBody {
    Evm(TransactionReceipt),
    Cosmos(CosmosTxResult),
}

/// Receipt normalized across chain families. `status` is true only for a
/// final, successful transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    pub status: bool,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub receipt: ChainReceiptBody,
}

impl ChainReceipt {
    pub fn family(&self) -> ChainFamily {
        match self.receipt {
            ChainReceiptBody::Evm(_) => ChainFamily::Evm,
            ChainReceiptBody::Cosmos(_) => ChainFamily::Cosmos,
        }
    }
}

/// Deposit fields extracted from a source receipt. Any field may be absent;
/// [`DecodedDeposit::payout_target`] rejects the ones a payout needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedDeposit {
    pub source_token: Option<String>,
    pub source_amount: Option<String>,
    pub source_chain_id: Option<String>,
    pub target_chain_id: Option<String>,
    pub target_token: Option<String>,
    pub target_address: Option<String>,
    pub from: Option<String>,
    pub swap_bridge_amount: Option<String>,
    pub settled_amount: Option<String>,
    pub withdrawal_data_hash: Option<String>,
}

/// The deposit fields every payout scheme requires
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutTarget {
    pub source_chain_id: String,
    pub target_chain_id: String,
    pub target_token: String,
    pub target_address: String,
}

impl DecodedDeposit {
    pub fn payout_target(&self) -> GeneratorResult<PayoutTarget> {
        fn required(value: &Option<String>, name: &str) -> GeneratorResult<String> {
            value
                .as_ref()
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| GeneratorError::MalformedDeposit(format!("{} is missing", name)))
        }
        Ok(PayoutTarget {
            source_chain_id: required(&self.source_chain_id, "sourceChainId")?,
            target_chain_id: required(&self.target_chain_id, "targetChainId")?,
            target_token: required(&self.target_token, "targetToken")?,
            target_address: required(&self.target_address, "targetAddress")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SignatureWithHash {
    pub signature: String,
    pub hash: String,
}

/// Signed payout reported to the backend as `signedData`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAuthorization {
    pub transaction_hash: String,
    pub from: Option<String>,
    pub token: Option<String>,
    pub amount: Option<String>,
    pub chain_id: String,
    pub target_chain_id: String,
    pub target_token: String,
    pub target_address: String,
    pub salt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    pub signatures: Vec<SignatureWithHash>,
    pub hash: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_asset_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_asset_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_amount_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_amount_out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_one_inch_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_one_inch_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_amount: Option<String>,
}

/// Body of the backend update call
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_data: Option<PayoutAuthorization>,
    pub transaction: Value,
    pub transaction_receipt: Value,
}
