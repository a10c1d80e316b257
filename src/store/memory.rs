//! An in-process reference implementation of the KV store contract, used by
//! the test suite and by the CLI's `bootstrap`/`coverage` demo path.
//! Grounded on the `InMemoryBackend` pattern used for the same purpose in
//! the retrieved `lambdaclass-ethrex` storage crate (an `Arc<RwLock<..>>`
//! over a sorted map), extended with a per-transaction write overlay so a
//! discarded transaction's writes never become visible.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::bail;

use super::{KvStore, KvTransaction, ScanCallback, ScanControl, ScanDirection};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Arc<RwLock<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn begin(&self, writable: bool) -> anyhow::Result<Box<dyn KvTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            table: self.table.clone(),
            writable,
            overlay: RefCell::new(BTreeMap::new()),
            finished: Cell::new(false),
        }))
    }
}

struct MemoryTransaction {
    table: Arc<RwLock<Table>>,
    writable: bool,
    /// `None` marks a delete so a transaction-local delete shadows a
    /// committed value until this transaction commits or discards.
    overlay: RefCell<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    finished: Cell<bool>,
}

impl MemoryTransaction {
    fn require_writable(&self) -> anyhow::Result<()> {
        if !self.writable {
            bail!("transaction is read-only");
        }
        Ok(())
    }

    /// Materializes the prefix's visible key/value pairs: committed state
    /// overlaid with this transaction's uncommitted writes.
    fn visible_prefix(&self, prefix: &[u8]) -> anyhow::Result<Table> {
        let table = self
            .table
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        let mut merged: Table = table
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in self.overlay.borrow().iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged)
    }
}

impl KvTransaction for MemoryTransaction {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        if let Some(overlaid) = self.overlay.borrow().get(key) {
            return Ok(overlaid.clone());
        }
        let table = self
            .table
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(table.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8], _durable: bool) -> anyhow::Result<()> {
        self.require_writable()?;
        self.overlay
            .borrow_mut()
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
        self.require_writable()?;
        self.overlay.borrow_mut().insert(key.to_vec(), None);
        Ok(())
    }

    fn scan(
        &self,
        prefix: &[u8],
        seek_to: &[u8],
        direction: ScanDirection,
        callback: &mut ScanCallback<'_>,
    ) -> anyhow::Result<usize> {
        let visible = self.visible_prefix(prefix)?;
        let mut entries: Vec<(&Vec<u8>, &Vec<u8>)> = visible.iter().collect();
        match direction {
            ScanDirection::Forward => {
                if !seek_to.is_empty() {
                    entries.retain(|(k, _)| k.as_slice() >= seek_to);
                }
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            ScanDirection::Reverse => {
                if !seek_to.is_empty() {
                    entries.retain(|(k, _)| k.as_slice() <= seek_to);
                }
                entries.sort_by(|a, b| b.0.cmp(a.0));
            }
        }

        let mut visited = 0;
        for (key, value) in entries {
            visited += 1;
            if callback(key, value)? == ScanControl::Stop {
                break;
            }
        }
        Ok(visited)
    }

    fn commit(self: Box<Self>) -> anyhow::Result<()> {
        if self.finished.get() {
            return Ok(());
        }
        self.require_writable()?;
        let mut table = self
            .table
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        for (key, value) in self.overlay.into_inner() {
            match value {
                Some(v) => {
                    table.insert(key, v);
                }
                None => {
                    table.remove(&key);
                }
            }
        }
        self.finished.set(true);
        Ok(())
    }

    fn discard(self: Box<Self>) -> anyhow::Result<()> {
        self.finished.set(true);
        Ok(())
    }
}
