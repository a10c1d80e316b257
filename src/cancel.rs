//! Cooperative cancellation (§5), threaded through every public entry point.
//! An async ingest loop would reach for a `tokio::sync` shutdown channel;
//! this crate's engine is synchronous, so the same idea is expressed as a
//! cheaply cloneable flag checked at each suspension point (around KV calls
//! and helper calls) instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineError;

/// A cheaply cloneable cancellation flag. Clones share the same underlying
/// state, so cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `EngineError::Cancelled` if cancellation has been requested.
    /// Call sites sprinkle this around KV and helper calls the way the
    /// way a sync loop checks a shutdown channel between blocks.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
