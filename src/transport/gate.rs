//! Per-host concurrency gates
//!
//! Gates are created lazily and cached by `(host, limit)`, so every request to the
//! same destination shares one semaphore regardless of which component issued it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

/// Shared cache of per-host semaphores
#[derive(Debug, Clone, Default)]
pub struct HostGates {
    gates: Arc<Mutex<HashMap<(String, usize), Arc<Semaphore>>>>,
}

impl HostGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the gate for `host` admitting at most `limit` requests
    pub fn gate(&self, host: &str, limit: usize) -> Arc<Semaphore> {
        let limit = limit.max(1);
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);

        Arc::clone(
            gates
                .entry((host.to_string(), limit))
                .or_insert_with(|| {
                    tracing::debug!(host, limit, "Creating host gate");
                    Arc::new(Semaphore::new(limit))
                }),
        )
    }

    /// Number of gates created so far
    pub fn len(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
