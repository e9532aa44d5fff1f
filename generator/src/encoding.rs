// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Payout digests checked by the destination fund manager.
//!
//! Every EVM payout is authorized over an EIP-712 style digest
//! `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`. Non-EVM destinations
//! sign a JSON message as an EIP-191 personal message instead.

use ethers::abi::{encode, Token};
use ethers::types::{Address as EthAddress, Bytes, H256, U256};
use ethers::utils::keccak256;

pub const DEFAULT_CONTRACT_NAME: &str = "FERRUM_TOKEN_BRIDGE_POOL";
pub const DEFAULT_CONTRACT_VERSION: &str = "000.004";

pub const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const WITHDRAW_SIGNED_TYPE: &str =
    "WithdrawSigned(address token,address payee,uint256 amount,bytes32 salt,uint256 expiry)";
pub const WITHDRAW_SIGNED_LEGACY_TYPE: &str =
    "WithdrawSigned(address token,address payee,uint256 amount,bytes32 salt)";
pub const WITHDRAW_SIGNED_ONE_INCH_TYPE: &str = "WithdrawSignedOneInch(address to,uint256 amountIn,uint256 amountOut,address foundryToken,address targetToken,bytes oneInchData,bytes32 salt,uint256 expiry)";

const EIP712_PREFIX: &[u8] = b"\x19\x01";

/// Hashes text the way the bridge contracts' off-chain tooling does: a
/// `0x`-prefixed hex string is hashed as the bytes it encodes, anything else
/// as UTF-8. Hex is read two digits at a time, so an odd trailing digit
/// becomes a byte of its own (`0xabc` hashes `[0xab, 0x0c]`).
pub fn keccak_text(text: &str) -> H256 {
    let hex_digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()));
    match hex_digits {
        Some(digits) => H256(keccak256(hex_pairs_to_bytes(digits))),
        None => H256(keccak256(text.as_bytes())),
    }
}

// Caller guarantees `digits` is ASCII hex
fn hex_pairs_to_bytes(digits: &str) -> Vec<u8> {
    digits
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

/// Per-transaction payout nonce. Validation hashes use the plain form;
/// this node's own signature appends the backend-supplied peer salt.
pub fn payout_salt(tx_hash: &str, peer_salt: Option<&str>) -> H256 {
    let mut preimage = tx_hash.to_lowercase();
    if let Some(peer) = peer_salt {
        preimage.push_str(peer);
    }
    keccak_text(&preimage)
}

/// Fingerprint of the swap parameters the source contract committed to in
/// the `Swap` event's `withdrawalData`.
pub fn withdrawal_data_hash(
    source_one_inch_data: &str,
    destination_one_inch_data: &str,
    destination_amount_in: &str,
    destination_amount_out: &str,
    source_asset_type: &str,
    destination_asset_type: &str,
) -> H256 {
    let preimage = [
        source_one_inch_data,
        destination_one_inch_data,
        destination_amount_in,
        destination_amount_out,
        source_asset_type,
        destination_asset_type,
    ]
    .concat();
    keccak_text(&preimage)
}

pub fn h256_hex(value: &H256) -> String {
    format!("0x{}", hex::encode(value.as_bytes()))
}

/// Name/version pair the fund manager hashes into its domain separator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutDomain {
    pub name: String,
    pub version: String,
}

impl Default for PayoutDomain {
    fn default() -> Self {
        Self::new(DEFAULT_CONTRACT_NAME, DEFAULT_CONTRACT_VERSION)
    }
}

impl PayoutDomain {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn separator(&self, chain_id: U256, verifying_contract: EthAddress) -> H256 {
        let encoded = encode(&[
            Token::FixedBytes(keccak256(EIP712_DOMAIN_TYPE).to_vec()),
            Token::FixedBytes(keccak256(self.name.as_bytes()).to_vec()),
            Token::FixedBytes(keccak256(self.version.as_bytes()).to_vec()),
            Token::Uint(chain_id),
            Token::Address(verifying_contract),
        ]);
        H256(keccak256(encoded))
    }

    pub fn digest(
        &self,
        chain_id: U256,
        verifying_contract: EthAddress,
        payout: &impl PayoutEncoding,
    ) -> H256 {
        let mut bytes = Vec::with_capacity(2 + 32 + 32);
        bytes.extend_from_slice(EIP712_PREFIX);
        bytes.extend_from_slice(self.separator(chain_id, verifying_contract).as_bytes());
        bytes.extend_from_slice(payout.struct_hash().as_bytes());
        H256(keccak256(bytes))
    }
}

pub trait PayoutEncoding {
    fn struct_hash(&self) -> H256;
}

/// `WithdrawSigned`: the fund manager pays `amount` of `token` to `payee`.
/// Without an expiry the legacy typehash is used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectAssetPayout {
    pub token: EthAddress,
    pub payee: EthAddress,
    pub amount: U256,
    pub salt: H256,
    pub expiry: Option<U256>,
}

impl PayoutEncoding for DirectAssetPayout {
    fn struct_hash(&self) -> H256 {
        let type_hash = match self.expiry {
            Some(_) => keccak256(WITHDRAW_SIGNED_TYPE),
            None => keccak256(WITHDRAW_SIGNED_LEGACY_TYPE),
        };
        let mut tokens = vec![
            Token::FixedBytes(type_hash.to_vec()),
            Token::Address(self.token),
            Token::Address(self.payee),
            Token::Uint(self.amount),
            Token::FixedBytes(self.salt.as_bytes().to_vec()),
        ];
        if let Some(expiry) = self.expiry {
            tokens.push(Token::Uint(expiry));
        }
        H256(keccak256(encode(&tokens)))
    }
}

/// `WithdrawSignedOneInch`: the fund manager swaps `amount_in` of the
/// foundry token through the aggregator into `target_token` for `to`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapPayout {
    pub to: EthAddress,
    pub amount_in: U256,
    pub amount_out: U256,
    pub foundry_token: EthAddress,
    pub target_token: EthAddress,
    pub one_inch_data: Bytes,
    pub salt: H256,
    pub expiry: U256,
}

impl PayoutEncoding for SwapPayout {
    fn struct_hash(&self) -> H256 {
        let encoded = encode(&[
            Token::FixedBytes(keccak256(WITHDRAW_SIGNED_ONE_INCH_TYPE).to_vec()),
            Token::Address(self.to),
            Token::Uint(self.amount_in),
            Token::Uint(self.amount_out),
            Token::Address(self.foundry_token),
            Token::Address(self.target_token),
            Token::Bytes(self.one_inch_data.to_vec()),
            Token::FixedBytes(self.salt.as_bytes().to_vec()),
            Token::Uint(self.expiry),
        ]);
        H256(keccak256(encoded))
    }
}

/// Message signed for a non-EVM destination. Field order and quoting are
/// part of the format; the destination contract rebuilds the same string.
pub fn non_evm_payout_message(
    chain_id: &str,
    payee: &str,
    token: &str,
    amount: &str,
    salt: &str,
) -> String {
    format!(
        r#"{{"chain_id":"{}","payee":"{}","token":"{}","amount":"{}","salt":"{}"}}"#,
        chain_id, payee, token, amount, salt
    )
}
