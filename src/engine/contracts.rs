//! The three external collaborator contracts (§6.2-§6.3): parser, helper,
//! handler. All three are out of scope as concrete implementations; the
//! engine only depends on these traits rather than any concrete
//! implementation of block parsing, node access, or notification delivery.

use crate::cancel::CancellationToken;
use crate::error::EngineResult;
use crate::ids::{AccountId, BlockId, CurrencyId};
use crate::model::{Amount, BalanceChange, BalanceExemption};

/// Converts a block into the balance deltas it implies, and answers
/// exemption lookups for a given account/currency.
pub trait Parser: Send + Sync {
    /// Balance changes implied by `block`. `reverse` selects the orphan
    /// path (§4.4.4), which may return a different change set than the
    /// forward path (e.g. omitting changes already known to be no-ops).
    fn balance_changes(
        &self,
        block: &BlockId,
        reverse: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<BalanceChange>>;

    /// Exemptions configured for this account/currency pair. Returning an
    /// empty vec means stored values are trusted without a live check
    /// (§4.4.3 row 3).
    fn find_exemptions(&self, account: &AccountId, currency: &CurrencyId) -> Vec<BalanceExemption>;
}

/// Fetches authoritative balances from the remote node the indexer
/// tracks, and exposes the exemption set the helper was configured with.
pub trait Helper: Send + Sync {
    fn account_balance(
        &self,
        account: &AccountId,
        currency: &CurrencyId,
        block: &BlockId,
        cancel: &CancellationToken,
    ) -> EngineResult<Amount>;

    /// Exemptions the helper was constructed with, consulted once by
    /// `BalanceEngine::initialize` when the caller didn't supply its own
    /// via `EngineConfig`.
    fn balance_exemptions(&self) -> Vec<BalanceExemption> {
        Vec::new()
    }
}

/// Receives post-commit notifications from the block worker façade.
pub trait Handler: Send + Sync {
    fn block_added(
        &self,
        block: &BlockId,
        changes: &[BalanceChange],
        cancel: &CancellationToken,
    ) -> EngineResult<()>;

    fn block_removed(
        &self,
        block: &BlockId,
        changes: &[BalanceChange],
        cancel: &CancellationToken,
    ) -> EngineResult<()>;
}
