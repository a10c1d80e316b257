//! `BlockWorker` façade (§4.6): the forward/backward hooks a block
//! synchronizer calls directly. Thin wrapper over `BalanceEngine` that adds
//! the periodic coverage-style log line `EngineConfig::reporting_cadence`
//! asks for, the way an ingest loop logs progress every so many blocks.
//! Logs via `tracing`, not `log`, matching this crate's split between
//! event-loop orchestration (`tracing`) and store-layer internals (`log`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::engine::{BalanceEngine, PostCommit};
use crate::error::EngineResult;
use crate::ids::BlockId;
use crate::store::KvTransaction;

pub struct BlockWorker {
    engine: Arc<BalanceEngine>,
    blocks_processed: AtomicU64,
}

impl BlockWorker {
    pub fn new(engine: Arc<BalanceEngine>) -> Self {
        Self {
            engine,
            blocks_processed: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<BalanceEngine> {
        &self.engine
    }

    /// Forwards to `BalanceEngine::adding_block`. The caller commits `txn`
    /// and then invokes the returned callback, never the other way around.
    pub fn adding_block(
        &self,
        txn: &dyn KvTransaction,
        block: &BlockId,
        parent_block: Option<&BlockId>,
        cancel: &CancellationToken,
    ) -> EngineResult<PostCommit> {
        let post_commit = self.engine.adding_block(txn, block, parent_block, cancel)?;
        self.report_progress();
        Ok(post_commit)
    }

    /// Forwards to `BalanceEngine::removing_block`.
    pub fn removing_block(
        &self,
        txn: &dyn KvTransaction,
        block: &BlockId,
        cancel: &CancellationToken,
    ) -> EngineResult<PostCommit> {
        let post_commit = self.engine.removing_block(txn, block, cancel)?;
        self.report_progress();
        Ok(post_commit)
    }

    fn report_progress(&self) {
        let cadence = self.engine.config().reporting_cadence;
        if cadence == 0 {
            return;
        }
        let processed = self.blocks_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % cadence == 0 {
            tracing::info!("block worker processed {processed} blocks ({})", self.engine.summary());
        }
    }
}
