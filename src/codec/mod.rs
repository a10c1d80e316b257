//! `KeyCodec` (§4.1) and `EntryCodec` (§4.2).

pub mod entries;
pub mod keys;
