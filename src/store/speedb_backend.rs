//! A real embedded-storage implementation of the `KvStore`/`KvTransaction`
//! contract, behind the `speedb-backend` feature. Uses direct `speedb::DB`
//! access (`get_pinned`/`write`/`iterator`, `IteratorMode::From(key,
//! Direction::Reverse)` for reverse scans), with a per-transaction write
//! overlay layered on top since `speedb::DB` itself has no notion of an
//! explicit transaction object.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use speedb::{Direction, IteratorMode, Options, WriteBatch, DB};

use super::{KvStore, KvTransaction, ScanCallback, ScanControl, ScanDirection};

pub struct SpeedbStore {
    db: Arc<DB>,
}

impl SpeedbStore {
    /// Opens (creating if absent) a speedb database at `path`, the way a
    /// long-lived store handle is constructed once at startup.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).context("opening speedb database")?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for SpeedbStore {
    fn begin(&self, writable: bool) -> anyhow::Result<Box<dyn KvTransaction + '_>> {
        Ok(Box::new(SpeedbTransaction {
            db: self.db.clone(),
            writable,
            overlay: RefCell::new(BTreeMap::new()),
            finished: Cell::new(false),
        }))
    }
}

struct SpeedbTransaction {
    db: Arc<DB>,
    writable: bool,
    overlay: RefCell<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    finished: Cell<bool>,
}

impl SpeedbTransaction {
    fn require_writable(&self) -> anyhow::Result<()> {
        if !self.writable {
            anyhow::bail!("transaction is read-only");
        }
        Ok(())
    }
}

impl KvTransaction for SpeedbTransaction {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        if let Some(overlaid) = self.overlay.borrow().get(key) {
            return Ok(overlaid.clone());
        }
        Ok(self.db.get_pinned(key)?.map(|v| v.to_vec()))
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
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        // With no explicit seek key, forward starts at the prefix itself;
        // reverse starts just past the prefix's lexicographic upper bound
        // so the first match is the greatest key under the prefix.
        let seek_key: Vec<u8> = if !seek_to.is_empty() {
            seek_to.to_vec()
        } else {
            match direction {
                ScanDirection::Forward => prefix.to_vec(),
                ScanDirection::Reverse => {
                    let mut upper = prefix.to_vec();
                    upper.push(0xff);
                    upper
                }
            }
        };
        let mode = match direction {
            ScanDirection::Forward => IteratorMode::From(&seek_key, Direction::Forward),
            ScanDirection::Reverse => IteratorMode::From(&seek_key, Direction::Reverse),
        };
        for item in self.db.iterator(mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
        }
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

        let mut entries: Vec<(&Vec<u8>, &Vec<u8>)> = merged.iter().collect();
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
        let mut batch = WriteBatch::default();
        for (key, value) in self.overlay.into_inner() {
            match value {
                Some(v) => batch.put(&key, &v),
                None => batch.delete(&key),
            }
        }
        self.db.write(batch)?;
        self.finished.set(true);
        Ok(())
    }

    fn discard(self: Box<Self>) -> anyhow::Result<()> {
        self.finished.set(true);
        Ok(())
    }
}
