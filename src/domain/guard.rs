//! Cycle guard: at most one orchestration cycle per instrument.
//!
//! Membership is handed out as a [`CycleLease`]; dropping the lease
//! removes the instrument. The lease moves into the spawned cycle task,
//! so release happens exactly once on every exit path, including
//! errors and panics.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::instrument::InstrumentId;

/// Set of instruments with a cycle in flight.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    running: Arc<Mutex<HashSet<InstrumentId>>>,
}

impl CycleGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the instrument. `None` if a cycle is already running.
    pub fn try_acquire(&self, instrument: InstrumentId) -> Option<CycleLease> {
        if !self.lock().insert(instrument) {
            return None;
        }
        Some(CycleLease {
            instrument,
            running: Arc::clone(&self.running),
        })
    }

    /// Number of cycles in flight.
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<InstrumentId>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of guard membership; releases on drop.
#[derive(Debug)]
pub struct CycleLease {
    instrument: InstrumentId,
    running: Arc<Mutex<HashSet<InstrumentId>>>,
}

impl Drop for CycleLease {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.instrument);
    }
}
