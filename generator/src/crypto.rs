// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::encoding::h256_hex;
use crate::error::{GeneratorError, GeneratorResult};
use crate::types::SignatureWithHash;
use ethers::core::k256::ecdsa::{
    signature::hazmat::PrehashSigner, RecoveryId, Signature as K256Signature, SigningKey,
};
use ethers::types::{Address as EthAddress, RecoveryMessage, Signature, H256, U256};
use ethers::utils::{hash_message, secret_key_to_address};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tap::TapFallible;

pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureParseError {
    #[error("signature is not valid hex: {0}")]
    InvalidHex(String),
    #[error("signature must be {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
    #[error("unsupported recovery id {0}")]
    InvalidRecoveryId(u64),
    #[error("signer recovery failed: {0}")]
    Recovery(String),
}

/// Maps any recovery id encoding to Ethereum's `{27, 28}`.
///
/// Accepts raw `0/1`, legacy `27/28` and EIP-155 `v = chain_id * 2 + 35 + parity`.
pub fn normalize_recovery_id(v: u64) -> Result<u8, SignatureParseError> {
    match v {
        0 | 1 => Ok(27 + v as u8),
        27 | 28 => Ok(v as u8),
        v if v >= 35 => Ok(27 + ((v - 35) % 2) as u8),
        v => Err(SignatureParseError::InvalidRecoveryId(v)),
    }
}

/// Secp256k1 operator key, already decrypted by the deployment's secret
/// manager.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorKey([u8; 32]);

impl std::fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OperatorKey(<redacted>)")
    }
}

impl OperatorKey {
    pub fn from_hex(value: &str) -> GeneratorResult<Self> {
        let trimmed = value.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped)
            .map_err(|_| GeneratorError::InvalidOperatorKey("key is not valid hex".into()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            GeneratorError::InvalidOperatorKey(format!("key must be 32 bytes, got {}", b.len()))
        })?;
        let key = Self(bytes);
        // Rejects zero and out-of-range scalars up front
        key.signing_key()?;
        Ok(key)
    }

    pub fn from_file(path: &Path) -> GeneratorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GeneratorError::InvalidOperatorKey(format!("cannot read {:?}: {}", path, e))
        })?;
        Self::from_hex(&content)
    }

    fn signing_key(&self) -> GeneratorResult<SigningKey> {
        SigningKey::from_slice(&self.0)
            .map_err(|e| GeneratorError::InvalidOperatorKey(e.to_string()))
    }

    pub fn address(&self) -> GeneratorResult<EthAddress> {
        Ok(secret_key_to_address(&self.signing_key()?))
    }
}

/// What a payout signature commits to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayoutMessage {
    /// EIP-712 digest signed as-is (EVM destinations)
    TypedDigest(H256),
    /// JSON payload signed as an EIP-191 personal message (non-EVM destinations)
    PersonalMessage(String),
}

impl PayoutMessage {
    pub fn signing_hash(&self) -> H256 {
        match self {
            PayoutMessage::TypedDigest(digest) => *digest,
            PayoutMessage::PersonalMessage(message) => hash_message(message),
        }
    }

    /// Value reported in the `hash` field next to a signature
    pub fn hash_field(&self) -> String {
        match self {
            PayoutMessage::TypedDigest(digest) => h256_hex(digest),
            PayoutMessage::PersonalMessage(message) => message.clone(),
        }
    }

    fn encode_signature(&self, signature: &PayoutSignature) -> String {
        match self {
            PayoutMessage::TypedDigest(_) => signature.to_prefixed_hex(),
            PayoutMessage::PersonalMessage(_) => signature.to_unprefixed_hex(),
        }
    }
}

/// `r ‖ s ‖ v` with `v` in `{27, 28}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutSignature(Signature);

impl PayoutSignature {
    pub fn inner(&self) -> &Signature {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn to_unprefixed_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl FromStr for PayoutSignature {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(stripped).map_err(|e| SignatureParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureParseError::InvalidLength(bytes.len()));
        }
        let v = normalize_recovery_id(bytes[64] as u64)?;
        Ok(Self(Signature {
            r: U256::from_big_endian(&bytes[0..32]),
            s: U256::from_big_endian(&bytes[32..64]),
            v: v as u64,
        }))
    }
}

/// Deterministic (RFC 6979), low-S secp256k1 signature over a 32-byte prehash.
pub fn sign_digest(digest: H256, key: &OperatorKey) -> GeneratorResult<PayoutSignature> {
    let signing_key = key.signing_key()?;
    let (signature, recovery_id): (K256Signature, RecoveryId) = signing_key
        .sign_prehash(digest.as_bytes())
        .map_err(|e| GeneratorError::SigningFailure(e.to_string()))?;
    let v = normalize_recovery_id(recovery_id.to_byte() as u64)
        .map_err(|e| GeneratorError::SigningFailure(e.to_string()))?;
    let bytes = signature.to_bytes();
    Ok(PayoutSignature(Signature {
        r: U256::from_big_endian(&bytes[0..32]),
        s: U256::from_big_endian(&bytes[32..64]),
        v: v as u64,
    }))
}

pub fn recover_signer(
    signature: &str,
    message: &PayoutMessage,
) -> Result<EthAddress, SignatureParseError> {
    let signature = PayoutSignature::from_str(signature)?;
    signature
        .0
        .recover(RecoveryMessage::Hash(message.signing_hash()))
        .map_err(|e| SignatureParseError::Recovery(e.to_string()))
}

/// Addresses of the generators whose signatures are accepted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratorAllowlist {
    addresses: HashSet<EthAddress>,
}

impl GeneratorAllowlist {
    pub fn new(addresses: impl IntoIterator<Item = EthAddress>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn single(address: EthAddress) -> Self {
        Self::new([address])
    }

    /// Parses either a JSON list of addresses or one bare address
    pub fn parse(value: &str) -> GeneratorResult<Self> {
        let value = value.trim();
        let entries: Vec<String> = if value.starts_with('[') {
            serde_json::from_str(value).map_err(|e| {
                GeneratorError::Generic(format!("invalid generator address list: {}", e))
            })?
        } else {
            vec![value.to_string()]
        };
        let addresses = entries
            .iter()
            .map(|entry| {
                EthAddress::from_str(entry.trim()).map_err(|_| {
                    GeneratorError::Generic(format!("invalid generator address {}", entry))
                })
            })
            .collect::<GeneratorResult<Vec<_>>>()?;
        Ok(Self::new(addresses))
    }

    pub fn contains(&self, address: &EthAddress) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// True iff `signature` recovers to an allowlisted generator. Malformed
/// input is a failed verification, never an error.
pub fn verify(signature: &str, message: &PayoutMessage, allowlist: &GeneratorAllowlist) -> bool {
    match recover_signer(signature, message) {
        Ok(address) => allowlist.contains(&address),
        Err(e) => {
            tracing::debug!("[Crypto] Signature rejected: {}", e);
            false
        }
    }
}

/// Pairwise check of peer signatures against locally computed messages.
/// Both lists must be non-empty and of equal length.
pub fn validate_signature_batch(
    peer_signatures: &[String],
    local_messages: &[PayoutMessage],
    allowlist: &GeneratorAllowlist,
) -> bool {
    if peer_signatures.is_empty() || peer_signatures.len() != local_messages.len() {
        return false;
    }
    peer_signatures
        .iter()
        .zip(local_messages)
        .all(|(signature, message)| verify(signature, message, allowlist))
}

/// Signs payout messages with the operator key and checks peer signatures
/// against the generator allowlist.
#[derive(Debug)]
pub struct GeneratorSigner {
    key: OperatorKey,
    address: EthAddress,
    allowlist: GeneratorAllowlist,
}

impl GeneratorSigner {
    pub fn new(key: OperatorKey, allowlist: GeneratorAllowlist) -> GeneratorResult<Self> {
        let address = key.address()?;
        Ok(Self {
            key,
            address,
            allowlist,
        })
    }

    pub fn address(&self) -> EthAddress {
        self.address
    }

    pub fn allowlist(&self) -> &GeneratorAllowlist {
        &self.allowlist
    }

    pub fn sign(&self, message: &PayoutMessage) -> GeneratorResult<SignatureWithHash> {
        let signature = sign_digest(message.signing_hash(), &self.key).tap_err(|e| {
            tracing::error!("[Crypto] Failed to sign payout: {:?}", e);
        })?;
        Ok(SignatureWithHash {
            signature: message.encode_signature(&signature),
            hash: message.hash_field(),
        })
    }

    pub fn validate_peer_signatures(
        &self,
        peer_signatures: &[String],
        local_messages: &[PayoutMessage],
    ) -> bool {
        validate_signature_batch(peer_signatures, local_messages, &self.allowlist)
    }
}
