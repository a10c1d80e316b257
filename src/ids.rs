//! Structured identifiers for accounts, currencies, and blocks.
//!
//! Accounts and currencies carry optional metadata and have no fixed field
//! order, so equality and key derivation both go through a canonical hash
//! rather than field-by-field comparison, the way a hand-written `Hash`
//! impl over a canonical address is preferred over deriving one over a
//! richer representation.

use std::collections::BTreeMap;
use std::fmt;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde::{Deserialize, Serialize};

/// 16-byte canonical hash of a structured identifier, hex-encoded when it
/// needs to appear in a key or log line.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalHash(pub [u8; 16]);

impl CanonicalHash {
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for CanonicalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalHash({})", self.to_hex())
    }
}

/// Implemented by any structured identifier that needs a stable, ordering-
/// independent hash for key derivation and set membership.
pub trait CanonicalHashed {
    fn canonical_hash(&self) -> CanonicalHash;
}

/// Hashes a sorted `field=value` encoding so that two identifiers built with
/// the same data in a different field/metadata order hash identically.
///
/// Each key and value is length-prefixed (as a fixed 8-byte big-endian
/// count) rather than delimited with `=`/`;`, so a `;` or `=` inside an
/// attacker-controlled `metadata` value can't be parsed as a field
/// boundary and make two structurally different identifiers collide onto
/// the same hash.
fn hash_canonical_fields(fields: &BTreeMap<String, String>) -> CanonicalHash {
    let mut hasher = Blake2bVar::new(16).expect("16 is a valid blake2b output size");
    for (key, value) in fields {
        Update::update(&mut hasher, &(key.len() as u64).to_be_bytes());
        Update::update(&mut hasher, key.as_bytes());
        Update::update(&mut hasher, &(value.len() as u64).to_be_bytes());
        Update::update(&mut hasher, value.as_bytes());
    }
    let mut out = [0u8; 16];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches requested size");
    CanonicalHash(out)
}

/// An on-chain account, possibly with sub-account metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountId {
    pub address: String,
    pub sub_account: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AccountId {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            sub_account: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_sub_account(mut self, sub_account: impl Into<String>) -> Self {
        self.sub_account = Some(sub_account.into());
        self
    }
}

impl CanonicalHashed for AccountId {
    fn canonical_hash(&self) -> CanonicalHash {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        fields.insert("address".to_string(), self.address.clone());
        if let Some(sub) = &self.sub_account {
            fields.insert("sub_account".to_string(), sub.clone());
        }
        for (k, v) in &self.metadata {
            fields.insert(format!("meta.{k}"), v.clone());
        }
        hash_canonical_fields(&fields)
    }
}

impl std::hash::Hash for AccountId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_hash().hash(state);
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_account {
            Some(sub) => write!(f, "{}/{}", self.address, sub),
            None => write!(f, "{}", self.address),
        }
    }
}

/// An asset identifier (symbol, decimals, metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyId {
    pub symbol: String,
    pub decimals: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CurrencyId {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            metadata: BTreeMap::new(),
        }
    }
}

impl CanonicalHashed for CurrencyId {
    fn canonical_hash(&self) -> CanonicalHash {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        fields.insert("symbol".to_string(), self.symbol.clone());
        fields.insert("decimals".to_string(), self.decimals.to_string());
        for (k, v) in &self.metadata {
            fields.insert(format!("meta.{k}"), v.clone());
        }
        hash_canonical_fields(&fields)
    }
}

impl std::hash::Hash for CurrencyId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_hash().hash(state);
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// `(account_id, currency_id)`, equal iff both canonical hashes match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountKey {
    pub account: AccountId,
    pub currency: CurrencyId,
}

impl AccountKey {
    pub fn new(account: AccountId, currency: CurrencyId) -> Self {
        Self { account, currency }
    }
}

impl PartialEq for AccountKey {
    fn eq(&self, other: &Self) -> bool {
        self.account.canonical_hash() == other.account.canonical_hash()
            && self.currency.canonical_hash() == other.currency.canonical_hash()
    }
}

impl Eq for AccountKey {}

impl std::hash::Hash for AccountKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.account.canonical_hash().hash(state);
        self.currency.canonical_hash().hash(state);
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account, self.currency)
    }
}

/// An ordered chain element identified by `(index, hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockId {
    pub index: i64,
    pub hash: String,
}

impl BlockId {
    pub fn new(index: i64, hash: impl Into<String>) -> Self {
        Self {
            index,
            hash: hash.into(),
        }
    }

    /// Short human-readable summary for log lines.
    pub fn summary(&self) -> String {
        let short_hash = if self.hash.len() > 12 {
            &self.hash[..12]
        } else {
            &self.hash
        };
        format!("{{ index: {}, hash: {short_hash} }}", self.index)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
