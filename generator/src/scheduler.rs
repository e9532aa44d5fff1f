// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::backend::TransactionBackend;
use crate::inflight::InFlightSet;
use crate::metrics::GeneratorMetrics;
use crate::pipeline::{PipelineOutcome, TransactionProcessor};
use crate::types::PendingTransaction;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
}

/// Fetches pending transactions on a fixed interval and runs one pipeline
/// task per transaction not already in flight.
pub struct PollScheduler {
    backend: Arc<dyn TransactionBackend>,
    processor: Arc<dyn TransactionProcessor>,
    inflight: Arc<InFlightSet>,
    metrics: Arc<GeneratorMetrics>,
    state: Mutex<SchedulerState>,
    poll_interval: Duration,
}

impl PollScheduler {
    pub fn new(
        backend: Arc<dyn TransactionBackend>,
        processor: Arc<dyn TransactionProcessor>,
        metrics: Arc<GeneratorMetrics>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            processor,
            inflight: Arc::new(InFlightSet::new()),
            metrics,
            state: Mutex::new(SchedulerState::Idle),
            poll_interval,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn inflight(&self) -> &Arc<InFlightSet> {
        &self.inflight
    }

    /// Starts a pipeline for `tx` unless its id is already owned by one.
    pub fn dispatch(&self, tx: PendingTransaction) -> Option<JoinHandle<PipelineOutcome>> {
        let Some(guard) = self.inflight.acquire(&tx.receive_transaction_id) else {
            debug!(
                "[PollScheduler] {} already in flight, skipping",
                tx.receive_transaction_id
            );
            return None;
        };
        self.metrics
            .inflight_transactions
            .set(self.inflight.len() as i64);

        let processor = self.processor.clone();
        let inflight = self.inflight.clone();
        let metrics = self.metrics.clone();
        Some(tokio::spawn(async move {
            let outcome = processor.process(tx).await;
            drop(guard);
            metrics.inflight_transactions.set(inflight.len() as i64);
            outcome
        }))
    }

    /// One polling round. Returns the handles of the pipelines it started.
    pub async fn poll_once(&self) -> Vec<JoinHandle<PipelineOutcome>> {
        {
            let mut state = self.state.lock();
            if *state == SchedulerState::Polling {
                debug!("[PollScheduler] Previous round still dispatching");
                return vec![];
            }
            *state = SchedulerState::Polling;
        }
        self.metrics.polls.inc();

        let handles = match self.backend.pending_transactions().await {
            Ok(pending) => {
                self.metrics
                    .pending_transactions_fetched
                    .inc_by(pending.len() as u64);
                debug!("[PollScheduler] {} pending transaction(s)", pending.len());
                pending
                    .into_iter()
                    .filter_map(|tx| self.dispatch(tx))
                    .collect()
            }
            Err(e) => {
                error!("[PollScheduler] Failed to fetch pending transactions: {:?}", e);
                vec![]
            }
        };

        *self.state.lock() = SchedulerState::Idle;
        handles
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "[PollScheduler] Starting, polling every {:?}",
            self.poll_interval
        );
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[PollScheduler] Cancelled");
                    break;
                }
                _ = interval.tick() => {
                    // Pipelines are detached; their guards release the ids
                    self.poll_once().await;
                }
            }
        }
    }
}
