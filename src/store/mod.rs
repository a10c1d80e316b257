//! The KV store contract (§6.1): out of scope as a concrete persistence
//! engine, expressed here as the `KvStore`/`KvTransaction` traits the engine
//! is generic over. `memory` ships an in-process reference implementation
//! used by the test suite and examples; `speedb` (behind the
//! `speedb-backend` feature) wires the same contract to a real embedded
//! store, wired to a real embedded `speedb` database.

pub mod memory;
#[cfg(feature = "speedb-backend")]
pub mod speedb_backend;

/// Scan direction for [`KvTransaction::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Reverse,
}

/// What a scan callback asks the store to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// A scan callback. Buffers are borrowed for the duration of the call only;
/// implementations must copy anything they need to keep (§4.3).
pub type ScanCallback<'a> = dyn FnMut(&[u8], &[u8]) -> anyhow::Result<ScanControl> + 'a;

/// A single read or read-write transaction over the engine's two key
/// namespaces. The engine never commits on its own behalf; the caller that
/// opened the transaction decides when to commit or discard.
pub trait KvTransaction {
    /// `(exists, value)`.
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;

    fn has(&self, key: &[u8]) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// `durable` hints whether the write should be fsync'd before the
    /// transaction commits; the in-memory reference store ignores it.
    fn set(&self, key: &[u8], value: &[u8], durable: bool) -> anyhow::Result<()>;

    fn delete(&self, key: &[u8]) -> anyhow::Result<()>;

    /// Scans keys under `prefix`, starting at `seek_to` and proceeding in
    /// `direction`, invoking `callback` for every key found until it returns
    /// `ScanControl::Stop` or the prefix is exhausted. Returns the number of
    /// keys visited.
    fn scan(
        &self,
        prefix: &[u8],
        seek_to: &[u8],
        direction: ScanDirection,
        callback: &mut ScanCallback<'_>,
    ) -> anyhow::Result<usize>;

    /// Commits the transaction. The engine relies on this being the only
    /// way mutations become visible to other transactions.
    fn commit(self: Box<Self>) -> anyhow::Result<()>;

    /// Discards the transaction without committing. Always callable, and
    /// idempotent: discarding a transaction that was already committed or
    /// discarded is a no-op rather than an error, so cleanup code can call
    /// it unconditionally on every exit path.
    fn discard(self: Box<Self>) -> anyhow::Result<()>;
}

/// Opens transactions. Implementations are shared across the process the
/// way a single `Arc`-shared `speedb::DB` is wrapped for process-wide use.
pub trait KvStore: Send + Sync {
    fn begin(&self, writable: bool) -> anyhow::Result<Box<dyn KvTransaction + '_>>;
}
