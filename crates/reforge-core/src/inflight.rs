use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::PipelineError;

/// Tracks which objects have a modification attempt running.
///
/// The pipeline itself never touches persisted state, so serialising
/// attempts on the same object is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `object_id` until the returned guard is dropped
    pub fn try_acquire(&self, object_id: &str) -> Result<InFlightGuard, PipelineError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(object_id.to_string()) {
            return Err(PipelineError::AlreadyInFlight(object_id.to_string()));
        }
        Ok(InFlightGuard {
            active: Arc::clone(&self.active),
            object_id: object_id.to_string(),
        })
    }

    pub fn is_in_flight(&self, object_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(object_id)
    }
}

/// Releases its object when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<String>>>,
    object_id: String,
}

impl InFlightGuard {
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.object_id);
    }
}
