//! `ReconciliationTracker` (§4.5): the per-account "last reconciled" cursor
//! and its coverage metric.

use crate::codec::entries::{decode_account_entry, encode_account_entry};
use crate::codec::keys::account_key;
use crate::error::{EngineError, EngineResult};
use crate::ids::{AccountId, BlockId, CurrencyId};
use crate::store::{KvTransaction, ScanControl, ScanDirection};

/// Advances `account`'s reconciliation cursor to `block`, unless it is
/// already ahead (I5: the cursor is monotone non-decreasing, so an
/// out-of-order reconciliation call from a lagging inactive reconciler is
/// a harmless no-op rather than an error).
pub fn reconciled(
    txn: &dyn KvTransaction,
    account: &AccountId,
    currency: &CurrencyId,
    block: &BlockId,
) -> EngineResult<()> {
    let key = account_key(account, currency);
    let bytes = txn
        .get(&key)
        .map_err(EngineError::Store)?
        .ok_or_else(|| EngineError::MissingAccount(format!("{account}/{currency}")))?;
    let mut entry = decode_account_entry(&bytes, true).map_err(EngineError::Store)?;

    if let Some(last) = &entry.last_reconciled {
        if last.index > block.index {
            log::trace!(
                "reconciled({account}/{currency}, {block}) is behind cursor {last}, no-op"
            );
            return Ok(());
        }
    }

    entry.last_reconciled = Some(block.clone());
    let bytes = encode_account_entry(&entry).map_err(EngineError::Store)?;
    txn.set(&key, &bytes, true).map_err(EngineError::Store)?;
    log::trace!("reconciled({account}/{currency}) cursor advanced to {block}");
    Ok(())
}

/// Fraction of all AccountEntries whose reconciliation cursor is at or past
/// `minimum_index`. `0.0` when there are no accounts at all.
pub fn reconciliation_coverage(
    txn: &dyn KvTransaction,
    minimum_index: i64,
) -> EngineResult<f64> {
    let mut seen: u64 = 0;
    let mut valid: u64 = 0;
    txn.scan(b"account/", b"", ScanDirection::Forward, &mut |_key, value| {
        seen += 1;
        if let Ok(entry) = decode_account_entry(value, false) {
            if entry
                .last_reconciled
                .as_ref()
                .is_some_and(|b| b.index >= minimum_index)
            {
                valid += 1;
            }
        }
        Ok(ScanControl::Continue)
    })
    .map_err(EngineError::Store)?;

    if seen == 0 {
        return Ok(0.0);
    }
    Ok(valid as f64 / seen as f64)
}
