//! Invocation correlator: pending-call table per proxy or adapter instance.

use std::collections::HashMap;

/// Default timeout for a pending invocation in ticks (30 s at the nominal
/// 1 Hz tick). Upstream protocol has no timeout; without one the table
/// grows without bound when peers never answer.
pub const DEFAULT_INVOCATION_TIMEOUT_TICKS: u64 = 30;

struct Pending<T> {
    call: T,
    issued_at: u64,
}

/// Maps invocation id -> pending call. Ids only need to be unique among
/// concurrently outstanding calls on the owning instance; freshly issued
/// ids are random v4 UUIDs (collision probability accepted as negligible).
pub struct Correlator<T> {
    pending: HashMap<String, Pending<T>>,
    timeout_ticks: u64,
}

impl<T> Correlator<T> {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_INVOCATION_TIMEOUT_TICKS)
    }

    pub fn with_timeout(timeout_ticks: u64) -> Self {
        Self {
            pending: HashMap::new(),
            timeout_ticks,
        }
    }

    /// Generate a fresh id and register the pending call.
    pub fn issue(&mut self, call: T, now_tick: u64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.register(&id, call, now_tick);
        id
    }

    /// Register a pending call under a caller-chosen id.
    pub fn register(&mut self, id: &str, call: T, now_tick: u64) {
        self.pending.insert(
            id.to_owned(),
            Pending {
                call,
                issued_at: now_tick,
            },
        );
    }

    /// Remove and return the pending call, or None for unknown ids.
    pub fn resolve(&mut self, id: &str) -> Option<T> {
        self.pending.remove(id).map(|p| p.call)
    }

    /// Remove and return every entry older than the timeout.
    pub fn expire(&mut self, now_tick: u64) -> Vec<(String, T)> {
        let timeout = self.timeout_ticks;
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now_tick.saturating_sub(p.issued_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|p| (id, p.call)))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self::new()
    }
}
