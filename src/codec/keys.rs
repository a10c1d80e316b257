//! Deterministic key construction for the two keyspaces (§4.1), and prefix
//! derivation for range scans. Keys are built as `account/`- and
//! `balance/`-prefixed UTF-8 strings rather than packed binary, since
//! nothing here needs fixed-width binary sort order beyond the
//! zero-padded block index (I6).

use crate::ids::{AccountId, AccountKey, CanonicalHashed, CurrencyId};

const ACCOUNT_NAMESPACE: &str = "account";
const BALANCE_NAMESPACE: &str = "balance";
const INDEX_WIDTH: usize = 20;

/// Zero-pads a non-negative block index to 20 decimal digits so that
/// lexicographic and numeric order agree across the full `i64` range (I6).
pub fn zpad20(index: i64) -> String {
    assert!(index >= 0, "block indices must be non-negative to be keyed");
    format!("{index:0width$}", width = INDEX_WIDTH)
}

/// `"account/" || H(account) || "/" || H(currency)`
pub fn account_key(account: &AccountId, currency: &CurrencyId) -> Vec<u8> {
    format!(
        "{ACCOUNT_NAMESPACE}/{}/{}",
        account.canonical_hash().to_hex(),
        currency.canonical_hash().to_hex()
    )
    .into_bytes()
}

pub fn account_key_for(key: &AccountKey) -> Vec<u8> {
    account_key(&key.account, &key.currency)
}

/// `"balance/" || H(account) || "/" || H(currency) || "/"` — the prefix
/// shared by every historical-balance key for one `AccountKey`.
pub fn historical_prefix(account: &AccountId, currency: &CurrencyId) -> Vec<u8> {
    format!(
        "{BALANCE_NAMESPACE}/{}/{}/",
        account.canonical_hash().to_hex(),
        currency.canonical_hash().to_hex()
    )
    .into_bytes()
}

/// `"balance/" || H(account) || "/" || H(currency) || "/" || zpad20(block_index)`
pub fn historical_key(account: &AccountId, currency: &CurrencyId, block_index: i64) -> Vec<u8> {
    let mut key = historical_prefix(account, currency);
    key.extend_from_slice(zpad20(block_index).as_bytes());
    key
}
