//! Error taxonomy for the balance engine.
//!
//! Callers (the synchronizer) need to tell data problems apart from
//! transport and cancellation problems, so each kind in §7 gets its own
//! variant rather than a single flattened error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Orphan hash mismatch at a stored index, a duplicate-update attempt,
    /// or an account/history inconsistency (I3, I4).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A value failed to parse as an integer, or an addition overflowed.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// The computed balance is negative and no exemption authorized it.
    #[error("negative balance for {account_key}: {value}")]
    NegativeBalance { account_key: String, value: String },

    /// The authoritative balance differs from the computed one and no
    /// exemption matches the difference.
    #[error("invalid live balance for {account_key}: stored {stored}, live {live}")]
    InvalidLiveBalance {
        account_key: String,
        stored: String,
        live: String,
    },

    /// Reconciliation was requested for an account with no AccountEntry.
    #[error("missing account: {0}")]
    MissingAccount(String),

    /// The underlying KV store failed.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    /// The remote balance helper failed.
    #[error("helper error: {0}")]
    Helper(String),

    /// Cancellation was observed before the operation completed.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn arithmetic(msg: impl Into<String>) -> Self {
        Self::Arithmetic(msg.into())
    }

    pub fn helper(msg: impl Into<String>) -> Self {
        Self::Helper(msg.into())
    }

    /// True for error kinds the caller may reasonably distinguish from a
    /// plain data error when deciding whether to retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Helper(_) | Self::Cancelled)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
