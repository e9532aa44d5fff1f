// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One run per pending transaction: confirm the source receipt, decode the
//! deposit, validate it, sign the payout and report to the backend.

use crate::backend::TransactionBackend;
use crate::chain_registry::{ChainClients, TokenDecimals};
use crate::crypto::{GeneratorSigner, PayoutMessage};
use crate::encoding::{
    h256_hex, non_evm_payout_message, payout_salt, DirectAssetPayout, PayoutDomain, SwapPayout,
};
use crate::error::{GeneratorError, GeneratorResult, TxNotFinalizedInfo};
use crate::events::{address_hex, decoder_for, DecodeContext};
use crate::metrics::GeneratorMetrics;
use crate::networks::{parse_evm_chain_id, NetworkTable};
use crate::receipt::{get_receipt, ReceiptOutcome, RetryPolicy, SourceChainClient};
use crate::retry_with_max_elapsed_time;
use crate::settlement::{check_withdrawal_data, parse_amount, ChainEndpoint, SettlementValidator};
use crate::types::{
    ChainReceipt, DecodedDeposit, DestinationAssetType, PayoutAuthorization, PayoutTarget,
    PendingTransaction, TransactionUpdate,
};
use async_trait::async_trait;
use ethers::types::{Address as EthAddress, Bytes, H256, U256};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_REPORT_MAX_ELAPSED: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The backend recorded the outcome. `signed` is false when a
    /// validation failure withheld the authorization.
    Reported { signed: bool },
    /// Nothing was reported; the next poll may pick the transaction up again
    Released { reason: GeneratorError },
}

#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    async fn process(&self, tx: PendingTransaction) -> PipelineOutcome;
}

// Messages to sign and the messages peers are expected to have signed
struct PayoutPlan {
    own: Vec<PayoutMessage>,
    expected: Vec<PayoutMessage>,
    salt: H256,
    target_token: String,
    expiry: Option<u64>,
}

fn parse_address(value: &str, field: &str) -> GeneratorResult<EthAddress> {
    EthAddress::from_str(value.trim()).map_err(|_| {
        GeneratorError::MalformedDeposit(format!("{} is not an EVM address: {}", field, value))
    })
}

fn parse_call_data(value: Option<&str>) -> GeneratorResult<Bytes> {
    let value = value.unwrap_or_default();
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|_| GeneratorError::MalformedDeposit("oneInchData is not hex".to_string()))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> GeneratorResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GeneratorError::MalformedDeposit(format!("{} is missing", field)))
}

pub struct Pipeline {
    networks: Arc<NetworkTable>,
    clients: Arc<dyn ChainClients>,
    settlement: SettlementValidator,
    signer: Arc<GeneratorSigner>,
    backend: Arc<dyn TransactionBackend>,
    metrics: Arc<GeneratorMetrics>,
    domain: PayoutDomain,
    retry_policy: RetryPolicy,
    report_max_elapsed: Duration,
}

impl Pipeline {
    pub fn new(
        networks: Arc<NetworkTable>,
        clients: Arc<dyn ChainClients>,
        decimals: Arc<dyn TokenDecimals>,
        signer: Arc<GeneratorSigner>,
        backend: Arc<dyn TransactionBackend>,
        metrics: Arc<GeneratorMetrics>,
    ) -> Self {
        Self {
            settlement: SettlementValidator::new(networks.clone(), decimals),
            networks,
            clients,
            signer,
            backend,
            metrics,
            domain: PayoutDomain::default(),
            retry_policy: RetryPolicy::default(),
            report_max_elapsed: DEFAULT_REPORT_MAX_ELAPSED,
        }
    }

    pub fn with_domain(mut self, domain: PayoutDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_report_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.report_max_elapsed = max_elapsed;
        self
    }

    fn source_rpc_url<'a>(&'a self, tx: &'a PendingTransaction) -> GeneratorResult<&'a str> {
        let chain_id = &tx.source_network.chain_id;
        tx.source_network
            .rpc_url()
            .or_else(|| self.networks.rpc_url(chain_id))
            .ok_or_else(|| GeneratorError::UnknownNetwork(format!("no rpc url for {}", chain_id)))
    }

    fn destination_rpc_url<'a>(&'a self, tx: &'a PendingTransaction) -> GeneratorResult<&'a str> {
        let chain_id = &tx.destination_network.chain_id;
        tx.destination_network
            .rpc_url()
            .or_else(|| self.networks.rpc_url(chain_id))
            .ok_or_else(|| GeneratorError::UnknownNetwork(format!("no rpc url for {}", chain_id)))
    }

    async fn confirm_source(
        &self,
        tx: &PendingTransaction,
    ) -> GeneratorResult<(Arc<dyn SourceChainClient>, ChainReceipt)> {
        let family = tx.source_network.family();
        let client = self
            .clients
            .source_client(family, self.source_rpc_url(tx)?)?;
        match get_receipt(&tx.receive_transaction_id, client.as_ref(), &self.retry_policy).await {
            ReceiptOutcome::Confirmed(receipt) if receipt.status => Ok((client, receipt)),
            ReceiptOutcome::Confirmed(receipt) => {
                tracing::warn!(
                    "[Pipeline] Source transaction {} failed on chain (code {:?})",
                    receipt.transaction_hash,
                    receipt.code
                );
                Err(GeneratorError::OriginTxFailed)
            }
            ReceiptOutcome::Rejected(e) => Err(e),
            ReceiptOutcome::Exhausted { attempts } => {
                Err(GeneratorError::TxNotFinalized(TxNotFinalizedInfo {
                    chain: family.as_str().to_string(),
                    tx_id: tx.receive_transaction_id.clone(),
                    attempts,
                }))
            }
        }
    }

    fn decode(
        &self,
        tx: &PendingTransaction,
        receipt: &ChainReceipt,
    ) -> GeneratorResult<(DecodedDeposit, PayoutTarget)> {
        let source_chain_id = &tx.source_network.chain_id;
        let ctx = DecodeContext {
            source_chain_id,
            destination_non_evm: tx.is_destination_non_evm(),
            native_denom: self.networks.native_denom(source_chain_id),
        };
        let deposit = decoder_for(receipt.family()).decode(receipt, &ctx)?;
        let target = deposit.payout_target()?;
        Ok((deposit, target))
    }

    async fn validate_settlement(
        &self,
        tx: &PendingTransaction,
        deposit: &DecodedDeposit,
        target: &PayoutTarget,
    ) -> GeneratorResult<()> {
        let requested = tx.destination_amount_in.as_deref().ok_or_else(|| {
            GeneratorError::SettlementRejected("destinationAmountIn is missing".to_string())
        })?;
        let settled = deposit.settled_amount.as_deref().ok_or_else(|| {
            GeneratorError::SettlementRejected("deposit carries no settled amount".to_string())
        })?;
        let source = ChainEndpoint {
            chain_id: &target.source_chain_id,
            rpc_url: self.source_rpc_url(tx)?,
        };
        let destination = ChainEndpoint {
            chain_id: &target.target_chain_id,
            rpc_url: self.destination_rpc_url(tx)?,
        };
        let valid = self
            .settlement
            .is_settlement_valid(tx.slippage, &source, &destination, requested, settled)
            .await?;
        if !valid {
            return Err(GeneratorError::SettlementRejected(format!(
                "settled {} does not cover requested {}",
                settled, requested
            )));
        }
        check_withdrawal_data(tx, deposit.withdrawal_data_hash.as_deref())
    }

    fn plan_non_evm(
        &self,
        tx: &PendingTransaction,
        deposit: &DecodedDeposit,
        target: &PayoutTarget,
    ) -> GeneratorResult<PayoutPlan> {
        let amount = required(
            deposit
                .swap_bridge_amount
                .as_deref()
                .or(tx.bridge_amount.as_deref()),
            "bridgeAmount",
        )?;
        let message = |salt: &H256| {
            PayoutMessage::PersonalMessage(non_evm_payout_message(
                &target.target_chain_id,
                &target.target_address,
                &target.target_token,
                amount,
                &h256_hex(salt),
            ))
        };
        let salt = payout_salt(&tx.receive_transaction_id, tx.peer_salt());
        let plain_salt = payout_salt(&tx.receive_transaction_id, None);
        Ok(PayoutPlan {
            own: vec![message(&salt)],
            expected: vec![message(&plain_salt)],
            salt,
            target_token: target.target_token.clone(),
            expiry: tx.expiry,
        })
    }

    fn plan_evm(&self, tx: &PendingTransaction, target: &PayoutTarget) -> GeneratorResult<PayoutPlan> {
        let asset_type = DestinationAssetType::parse(tx.destination_asset_type.as_deref())?;
        let target_chain = target.target_chain_id.as_str();
        let chain_id = parse_evm_chain_id(target_chain)?;
        let fund_manager = self.networks.fund_manager(target_chain)?;
        let foundry_token = self.networks.foundry_token(target_chain)?;
        // Non-EVM sources name the target token in their own format
        let target_token = if tx.is_source_non_evm() {
            address_hex(&foundry_token)
        } else {
            target.target_token.clone()
        };
        let token = parse_address(&target_token, "targetToken")?;
        let payee = parse_address(&target.target_address, "targetAddress")?;
        let salt = payout_salt(&tx.receive_transaction_id, tx.peer_salt());
        let plain_salt = payout_salt(&tx.receive_transaction_id, None);
        let require_expiry = || {
            tx.expiry
                .ok_or_else(|| GeneratorError::MalformedDeposit("expiry is missing".to_string()))
        };

        let (own, expected, expiry) = match asset_type {
            // The fund manager only pays out its own foundry token directly,
            // whatever the deposit named as target
            DestinationAssetType::Foundary => {
                let amount = parse_amount(required(
                    tx.destination_amount_in
                        .as_deref()
                        .or(tx.bridge_amount.as_deref()),
                    "bridgeAmount",
                )?)?;
                let expiry = if self.networks.withdraw_with_expiry(target_chain) {
                    Some(require_expiry()?)
                } else {
                    None
                };
                let router = self.networks.fiber_router(target_chain)?;
                let digest = |payee: EthAddress, salt: H256| {
                    PayoutMessage::TypedDigest(self.domain.digest(
                        chain_id,
                        fund_manager,
                        &DirectAssetPayout {
                            token: foundry_token,
                            payee,
                            amount,
                            salt,
                            expiry: expiry.map(U256::from),
                        },
                    ))
                };
                (
                    vec![digest(payee, salt), digest(router, salt)],
                    vec![digest(payee, plain_salt), digest(router, plain_salt)],
                    expiry,
                )
            }
            DestinationAssetType::OneInch => {
                let amount_in = parse_amount(required(
                    tx.destination_amount_in.as_deref(),
                    "destinationAmountIn",
                )?)?;
                let amount_out = parse_amount(required(
                    tx.destination_amount_out.as_deref(),
                    "destinationAmountOut",
                )?)?;
                let expiry = require_expiry()?;
                let one_inch_data = parse_call_data(tx.destination_one_inch_data.as_deref())?;
                let digest = |salt: H256| {
                    PayoutMessage::TypedDigest(self.domain.digest(
                        chain_id,
                        fund_manager,
                        &SwapPayout {
                            to: payee,
                            amount_in,
                            amount_out,
                            foundry_token,
                            target_token: token,
                            one_inch_data: one_inch_data.clone(),
                            salt,
                            expiry: U256::from(expiry),
                        },
                    ))
                };
                (vec![digest(salt)], vec![digest(plain_salt)], Some(expiry))
            }
        };
        Ok(PayoutPlan {
            own,
            expected,
            salt,
            target_token,
            expiry,
        })
    }

    /// Validates and signs the payout. Security alerts surface as errors for
    /// which [`GeneratorError::is_security_alert`] holds.
    async fn attest(
        &self,
        tx: &PendingTransaction,
        receipt: &ChainReceipt,
        deposit: &DecodedDeposit,
        target: &PayoutTarget,
    ) -> GeneratorResult<PayoutAuthorization> {
        if !tx.is_source_non_evm() && !tx.is_destination_non_evm() {
            self.validate_settlement(tx, deposit, target).await?;
        }
        let plan = if tx.is_destination_non_evm() {
            self.plan_non_evm(tx, deposit, target)?
        } else {
            self.plan_evm(tx, target)?
        };

        if let Some(generator_sig) = &tx.generator_sig {
            let peer_signatures: Vec<String> = generator_sig
                .signatures
                .iter()
                .map(|s| s.signature.clone())
                .collect();
            if !self
                .signer
                .validate_peer_signatures(&peer_signatures, &plan.expected)
            {
                return Err(GeneratorError::InvalidPeerSignatures(format!(
                    "{} peer signature(s) for {} expected payout(s)",
                    peer_signatures.len(),
                    plan.expected.len()
                )));
            }
        }

        let signatures = plan
            .own
            .iter()
            .map(|message| self.signer.sign(message))
            .collect::<GeneratorResult<Vec<_>>>()?;
        let family = tx.destination_network.family().as_str();
        self.metrics
            .signatures_produced
            .with_label_values(&[family])
            .inc_by(signatures.len() as u64);
        let hash = signatures
            .first()
            .map(|s| s.hash.clone())
            .ok_or_else(|| GeneratorError::InternalError("empty payout plan".to_string()))?;

        Ok(PayoutAuthorization {
            transaction_hash: receipt.transaction_hash.clone(),
            from: deposit.from.clone(),
            token: deposit.source_token.clone(),
            amount: deposit.source_amount.clone(),
            chain_id: target.source_chain_id.clone(),
            target_chain_id: target.target_chain_id.clone(),
            target_token: plan.target_token,
            target_address: target.target_address.clone(),
            salt: h256_hex(&plan.salt),
            expiry: plan.expiry,
            signatures,
            hash,
            address: address_hex(&self.signer.address()),
            source_asset_type: tx.source_asset_type.clone(),
            destination_asset_type: tx.destination_asset_type.clone(),
            destination_amount_in: tx.destination_amount_in.clone(),
            destination_amount_out: tx.destination_amount_out.clone(),
            source_one_inch_data: tx.source_one_inch_data.clone(),
            destination_one_inch_data: tx.destination_one_inch_data.clone(),
            settled_amount: deposit.settled_amount.clone(),
        })
    }

    async fn report(&self, tx_id: &str, update: &TransactionUpdate) -> GeneratorResult<()> {
        match retry_with_max_elapsed_time!(
            self.backend.update_transaction(tx_id, update),
            self.report_max_elapsed
        ) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }

    async fn run(&self, tx: &PendingTransaction) -> GeneratorResult<bool> {
        let (client, receipt) = self.confirm_source(tx).await?;
        let (deposit, target) = self.decode(tx, &receipt)?;

        let signed_data = match self.attest(tx, &receipt, &deposit, &target).await {
            Ok(authorization) => Some(authorization),
            Err(e) if e.is_security_alert() => {
                tracing::error!(
                    security_alert = true,
                    kind = e.error_type(),
                    tx_id = %tx.receive_transaction_id,
                    "[Pipeline] Payout validation failed: {:?}",
                    e
                );
                self.metrics
                    .security_alerts
                    .with_label_values(&[e.error_type()])
                    .inc();
                None
            }
            Err(e) => return Err(e),
        };

        let transaction = client
            .transaction_details(&receipt, deposit.from.as_deref())
            .await?;
        let signed = signed_data.is_some();
        let update = TransactionUpdate {
            signed_data,
            transaction,
            transaction_receipt: serde_json::to_value(&receipt)?,
        };
        self.report(&tx.receive_transaction_id, &update).await?;
        Ok(signed)
    }
}

#[async_trait]
impl TransactionProcessor for Pipeline {
    async fn process(&self, tx: PendingTransaction) -> PipelineOutcome {
        let start = Instant::now();
        self.metrics.pipelines_started.inc();
        tracing::info!(
            "[Pipeline] Processing {} ({} -> {})",
            tx.receive_transaction_id,
            tx.source_network.chain_id,
            tx.destination_network.chain_id
        );

        let (outcome, label) = match self.run(&tx).await {
            Ok(signed) => {
                self.metrics.pipelines_ok.inc();
                tracing::info!(
                    "[Pipeline] Reported {} (signed={})",
                    tx.receive_transaction_id,
                    signed
                );
                let label = if signed { "signed" } else { "unsigned" };
                (PipelineOutcome::Reported { signed }, label)
            }
            Err(reason) => {
                self.metrics
                    .err_pipelines
                    .with_label_values(&[reason.error_type()])
                    .inc();
                tracing::warn!(
                    "[Pipeline] Released {} without report: {:?}",
                    tx.receive_transaction_id,
                    reason
                );
                (PipelineOutcome::Released { reason }, "released")
            }
        };
        self.metrics
            .pipeline_latency
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        outcome
    }
}
