//! Historical per-account balance storage engine for a blockchain indexer.
//!
//! Maintains, for every `(account, currency)` pair observed on a chain, a
//! full historical balance series keyed by block index, plus a
//! reconciliation cursor, and stays internally consistent across forward
//! block application and reorg-driven rollback. `codec` + `history` are the
//! low-level primitives `engine::BalanceEngine` is built on; `reconcile`,
//! `bootstrap`, and `worker` are the three higher-level operations layered
//! on top of it.

pub mod bootstrap;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ids;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod worker;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use engine::{BalanceEngine, Handler, Helper, Parser, PostCommit};
pub use error::{EngineError, EngineResult};
pub use ids::{AccountId, AccountKey, BlockId, CurrencyId};
pub use model::{Amount, BalanceChange, BalanceExemption};
pub use worker::BlockWorker;
