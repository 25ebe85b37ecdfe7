//! Scheduler-facing agent tracking which hash ranges this node owns.
//!
//! The agent keeps two concerns apart: the authoritative routing state lives
//! in the routing table and changes only through `set_ranges`, while the
//! locally-owned range list is bookkeeping the scheduler reads back to detect
//! drift between what it granted and what the node believes it holds.

use crate::types::{Range, SetRangesRequest};
use std::sync::{Arc, RwLock};

/// Sink for authoritative range assignments. Implemented by the routing
/// table; test doubles record the request instead.
pub trait RangeSetter: Send + Sync {
    fn set_ranges(&self, req: &SetRangesRequest);
}

pub struct OrchestratorAgent<S> {
    /// Ranges believed to be owned by this node. A hint for scheduler
    /// reconciliation, never consulted for routing.
    owned: RwLock<Vec<Range>>,
    setter: Arc<S>,
}

impl<S: RangeSetter> OrchestratorAgent<S> {
    pub fn new(setter: Arc<S>) -> Self {
        Self {
            owned: RwLock::new(Vec::new()),
            setter,
        }
    }

    /// Record a range grant. Grants are not deduplicated.
    pub fn add_range(&self, range: Range) {
        self.owned
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(range);
    }

    /// Revoke the first grant matching `(start, end)` exactly. No-op when
    /// absent.
    pub fn remove_range(&self, range: Range) {
        let mut owned = self.owned.write().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = owned.iter().position(|r| *r == range) {
            owned.remove(pos);
        }
    }

    /// Snapshot of the owned-range list for reconciliation.
    pub fn list_ranges(&self) -> Vec<Range> {
        self.owned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Pass the scheduler's authoritative assignment through to the routing
    /// table. Takes no lock; the owned list is unaffected.
    pub fn set_ranges(&self, req: &SetRangesRequest) {
        self.setter.set_ranges(req);
    }
}
