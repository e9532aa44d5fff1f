// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::scheduler::PollScheduler;
use crate::types::PendingTransaction;
use std::sync::Arc;
use tracing::info;

pub trait JobDispatcherTrait {
    /// Starts a pipeline for `tx`. Returns false if its id is already in flight.
    fn dispatch(&self, tx: PendingTransaction) -> bool;

    fn inflight_count(&self) -> usize;
}

/// Feeds externally submitted transactions into the scheduler's dispatch path
pub struct JobRequestHandler {
    scheduler: Arc<PollScheduler>,
}

impl JobRequestHandler {
    pub fn new(scheduler: Arc<PollScheduler>) -> Self {
        Self { scheduler }
    }
}

impl JobDispatcherTrait for JobRequestHandler {
    fn dispatch(&self, tx: PendingTransaction) -> bool {
        let id = tx.receive_transaction_id.clone();
        let accepted = self.scheduler.dispatch(tx).is_some();
        info!("[JobRequestHandler] Job {} accepted={}", id, accepted);
        accepted
    }

    fn inflight_count(&self) -> usize {
        self.scheduler.inflight().len()
    }
}
