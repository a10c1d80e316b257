//! `HistoryIndex` (§4.3): the two range primitives over the historical-
//! balance namespace that the engine builds everything else on top of.
//! `last_at_or_before` is a reverse-iterator lookup
//! (`IteratorMode::From(key, Direction::Reverse)`); `delete_from_index`
//! collects keys before deleting them so the scan is never invalidated
//! mid-iteration while a sorted index is being maintained.

use crate::codec::entries::{decode_balance_entry, encode_balance_entry};
use crate::codec::keys::{historical_key, historical_prefix};
use crate::error::{EngineError, EngineResult};
use crate::ids::{AccountId, BlockId, CurrencyId};
use crate::model::BalanceEntry;
use crate::store::{KvTransaction, ScanControl, ScanDirection};

/// Scans backward from `block`'s historical key and returns the closest
/// entry at or before it, or `None` if the account has no history at all.
///
/// Fails with `EngineError::Integrity` if the entry found at `block.index`
/// carries a different hash than `block.hash` (I3): that means a reorg at
/// this index was never recorded.
pub fn last_at_or_before(
    txn: &dyn KvTransaction,
    account: &AccountId,
    currency: &CurrencyId,
    block: &BlockId,
) -> EngineResult<Option<BalanceEntry>> {
    let prefix = historical_prefix(account, currency);
    let seek_to = historical_key(account, currency, block.index);

    let mut found: Option<BalanceEntry> = None;
    let mut decode_err: Option<EngineError> = None;
    txn.scan(
        &prefix,
        &seek_to,
        ScanDirection::Reverse,
        &mut |_key, value| {
            match decode_balance_entry(value, false) {
                Ok(entry) => found = Some(entry),
                Err(e) => decode_err = Some(EngineError::Store(e)),
            }
            Ok(ScanControl::Stop)
        },
    )
    .map_err(EngineError::Store)?;

    if let Some(err) = decode_err {
        return Err(err);
    }

    let Some(entry) = found else {
        return Ok(None);
    };

    if entry.block.index == block.index && entry.block.hash != block.hash {
        return Err(EngineError::integrity(format!(
            "hash mismatch at index {}: stored {:?}, queried {:?} (missed reorg)",
            block.index, entry.block.hash, block.hash
        )));
    }

    log::trace!(
        "last_at_or_before({account}/{currency}, {block}) -> {}",
        entry.block
    );
    Ok(Some(entry))
}

/// Deletes every historical-balance entry for `(account, currency)` at an
/// index `>= from_index`. `from_index == -1` wipes the whole series.
///
/// Keys are collected during the scan and deleted afterward, matching the
/// two-pass delete pattern so the in-flight scan is never mutated under
/// itself.
pub fn delete_from_index(
    txn: &dyn KvTransaction,
    account: &AccountId,
    currency: &CurrencyId,
    from_index: i64,
) -> EngineResult<usize> {
    let prefix = historical_prefix(account, currency);
    let seek_to = if from_index < 0 {
        prefix.clone()
    } else {
        historical_key(account, currency, from_index)
    };

    let mut to_delete: Vec<Vec<u8>> = Vec::new();
    txn.scan(&prefix, &seek_to, ScanDirection::Forward, &mut |key, _value| {
        to_delete.push(key.to_vec());
        Ok(ScanControl::Continue)
    })
    .map_err(EngineError::Store)?;

    let count = to_delete.len();
    for key in &to_delete {
        txn.delete(key).map_err(EngineError::Store)?;
    }
    log::trace!("delete_from_index({account}/{currency}, {from_index}) removed {count} entries");
    Ok(count)
}

/// Writes a `BalanceEntry`, overwriting any existing entry at the same key.
pub fn write_entry(txn: &dyn KvTransaction, entry: &BalanceEntry) -> EngineResult<()> {
    let key = historical_key(&entry.account, &entry.amount.currency, entry.block.index);
    let bytes = encode_balance_entry(entry).map_err(EngineError::Store)?;
    txn.set(&key, &bytes, true).map_err(EngineError::Store)
}
