use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{EngineError, EngineResult};

/// Single-slot re-entrancy guard keyed by operation identity.
///
/// A second `try_acquire` for a key that is still held is rejected, never queued.
/// The slot frees itself when the returned ticket is dropped.
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

#[derive(Debug)]
pub struct GuardTicket {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl GuardTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.key);
        }
    }
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: impl Into<String>) -> EngineResult<GuardTicket> {
        let key = key.into();
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| EngineError::OperationInProgress(format!("{} (guard poisoned)", key)))?;
        if !set.insert(key.clone()) {
            return Err(EngineError::OperationInProgress(key));
        }
        Ok(GuardTicket { key, in_flight: self.in_flight.clone() })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.in_flight.lock().map(|set| set.contains(key)).unwrap_or(false)
    }
}
