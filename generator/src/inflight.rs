// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Transaction ids currently owned by a pipeline. An id is present at most
/// once; whoever inserted it removes it.
#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: Mutex<HashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id is already tracked
    pub fn try_acquire(&self, id: &str) -> bool {
        self.ids.lock().insert(id.to_string())
    }

    pub fn release(&self, id: &str) -> bool {
        self.ids.lock().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// Acquires `id` for the lifetime of the returned guard
    pub fn acquire(self: &Arc<Self>, id: &str) -> Option<InFlightGuard> {
        if self.try_acquire(id) {
            Some(InFlightGuard {
                set: self.clone(),
                id: id.to_string(),
            })
        } else {
            None
        }
    }
}

/// Releases its id on drop, including when the owning task panics or is
/// cancelled.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    id: String,
}

impl InFlightGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.set.release(&self.id) {
            tracing::warn!("[InFlightSet] {} was already released", self.id);
        }
    }
}
