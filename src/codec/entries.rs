//! Opaque symmetric encode/decode of `AccountEntry` and `BalanceEntry` to
//! the byte payloads the KV store holds, using `serde_json::to_vec`/
//! `from_slice` rather than a packed binary format.

use anyhow::Context;

use crate::model::{AccountEntry, BalanceEntry};

/// Encodes an `AccountEntry` for storage at its `AccountKey`.
pub fn encode_account_entry(entry: &AccountEntry) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(entry).context("encoding account entry")
}

/// Decodes an `AccountEntry`.
///
/// `reclaim_allowed` mirrors the §6.1 `decode` contract's flag forbidding
/// internal reuse of the input buffer: when `false`, the caller is a scan
/// callback that only lends `bytes` for the duration of the call, so the
/// decoded value must not borrow from it. Since this codec always produces
/// an owned `AccountEntry`, both paths are safe; the flag exists so call
/// sites document which guarantee they're relying on.
pub fn decode_account_entry(bytes: &[u8], reclaim_allowed: bool) -> anyhow::Result<AccountEntry> {
    let _ = reclaim_allowed;
    serde_json::from_slice(bytes).context("decoding account entry")
}

/// Encodes a `BalanceEntry` for storage at its historical key.
pub fn encode_balance_entry(entry: &BalanceEntry) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(entry).context("encoding balance entry")
}

/// Decodes a `BalanceEntry`. See [`decode_account_entry`] for the meaning of
/// `reclaim_allowed`.
pub fn decode_balance_entry(bytes: &[u8], reclaim_allowed: bool) -> anyhow::Result<BalanceEntry> {
    let _ = reclaim_allowed;
    serde_json::from_slice(bytes).context("decoding balance entry")
}
