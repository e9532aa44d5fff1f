// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A mock implementation for `JobDispatcherTrait` that records submitted
//! jobs and tracks a fake in-flight set.

use super::handler::JobDispatcherTrait;
use crate::types::PendingTransaction;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Default)]
pub struct MockJobDispatcher {
    dispatched: Mutex<Vec<PendingTransaction>>,
    inflight: Mutex<HashSet<String>>,
}

impl MockJobDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<PendingTransaction> {
        self.dispatched.lock().clone()
    }

    pub fn finish(&self, id: &str) {
        self.inflight.lock().remove(id);
    }
}

impl JobDispatcherTrait for MockJobDispatcher {
    fn dispatch(&self, tx: PendingTransaction) -> bool {
        if !self.inflight.lock().insert(tx.receive_transaction_id.clone()) {
            return false;
        }
        self.dispatched.lock().push(tx);
        true
    }

    fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }
}
