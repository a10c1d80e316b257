//! `EngineConfig` (§1.1): constructed once at process start and handed to
//! `BalanceEngine::initialize`.

use crate::ids::BlockId;
use crate::model::BalanceExemption;

/// Configuration consumed once by `BalanceEngine::initialize`. Re-supplying
/// a different config to an already-initialized engine is a logic error
/// (§5: "subsequent operations must not re-assign" helper/handler).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub genesis_block: BlockId,
    pub exemptions: Vec<BalanceExemption>,
    /// How often (in applied blocks) the worker façade logs a coverage
    /// summary at `info` level. `0` disables periodic reporting.
    pub reporting_cadence: u64,
}

impl EngineConfig {
    pub fn new(genesis_block: BlockId) -> Self {
        Self {
            genesis_block,
            exemptions: Vec::new(),
            reporting_cadence: 0,
        }
    }

    pub fn with_exemptions(mut self, exemptions: Vec<BalanceExemption>) -> Self {
        self.exemptions = exemptions;
        self
    }

    pub fn with_reporting_cadence(mut self, cadence: u64) -> Self {
        self.reporting_cadence = cadence;
        self
    }
}
