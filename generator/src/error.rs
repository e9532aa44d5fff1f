// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

/// Why a source transaction is not usable yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxNotFinalizedInfo {
    /// Chain family the transaction lives on ("evm", "cosmos")
    pub chain: String,
    /// Source transaction id as supplied by the backend
    pub tx_id: String,
    /// Number of receipt lookups performed before giving up
    pub attempts: u32,
}

impl std::fmt::Display for TxNotFinalizedInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transaction {} is not finalized on {} after {} attempts.",
            self.tx_id, self.chain, self.attempts
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    // The input is not a valid transaction hash
    InvalidTxHash(String),
    // The referenced transaction was included but failed
    OriginTxFailed,
    // The referenced transaction does not exist
    TxNotFound,
    // Receipt still pending after the retry budget
    TxNotFinalized(TxNotFinalizedInfo),
    // No recognized deposit event in the receipt
    NoDepositEventInReceipt,
    // Deposit event found but a field is missing or undecodable
    MalformedDeposit(String),
    // Chain id has no row in the network table
    UnknownNetwork(String),
    // destinationAssetType is neither Foundary nor 1Inch
    UnsupportedAssetType(String),
    // Amount string is not a base-10 integer
    InvalidAmount(String),
    // Settled amount does not cover the requested payout
    SettlementRejected(String),
    // withdrawalData hash on chain differs from the backend payload
    WithdrawalDataMismatch,
    // Peer signatures do not recover to allowlisted generators
    InvalidPeerSignatures(String),
    // Operator key missing or unusable
    InvalidOperatorKey(String),
    // ECDSA signing failed
    SigningFailure(String),
    // Transient RPC provider error
    TransientProviderError(String),
    // RPC provider error
    ProviderError(String),
    // Backend REST call failed
    BackendError(String),
    // Internal error
    InternalError(String),
    // Uncategorized error
    Generic(String),
}

impl GeneratorError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            GeneratorError::InvalidTxHash(_) => "invalid_tx_hash",
            GeneratorError::OriginTxFailed => "origin_tx_failed",
            GeneratorError::TxNotFound => "tx_not_found",
            GeneratorError::TxNotFinalized(_) => "tx_not_finalized",
            GeneratorError::NoDepositEventInReceipt => "no_deposit_event",
            GeneratorError::MalformedDeposit(_) => "malformed_deposit",
            GeneratorError::UnknownNetwork(_) => "unknown_network",
            GeneratorError::UnsupportedAssetType(_) => "unsupported_asset_type",
            GeneratorError::InvalidAmount(_) => "invalid_amount",
            GeneratorError::SettlementRejected(_) => "settlement_rejected",
            GeneratorError::WithdrawalDataMismatch => "withdrawal_data_mismatch",
            GeneratorError::InvalidPeerSignatures(_) => "invalid_peer_signatures",
            GeneratorError::InvalidOperatorKey(_) => "invalid_operator_key",
            GeneratorError::SigningFailure(_) => "signing_failure",
            GeneratorError::TransientProviderError(_) => "transient_provider_error",
            GeneratorError::ProviderError(_) => "provider_error",
            GeneratorError::BackendError(_) => "backend_error",
            GeneratorError::InternalError(_) => "internal_error",
            GeneratorError::Generic(_) => "generic",
        }
    }

    /// Validation failures mean either a forged request or a configuration
    /// mismatch between generators. They are reported and alerted on.
    pub fn is_security_alert(&self) -> bool {
        matches!(
            self,
            GeneratorError::SettlementRejected(_)
                | GeneratorError::WithdrawalDataMismatch
                | GeneratorError::InvalidPeerSignatures(_)
        )
    }
}

impl<E> From<E> for GeneratorError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Generic(err.into().to_string())
    }
}

pub type GeneratorResult<T> = Result<T, GeneratorError>;
