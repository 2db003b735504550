//! Embedding API (spec.md §6 "Public entry points"): the boundary layer
//! wired directly to the pager, variable directory, and B+ tree cursor.
//! A `Database` holds at most one open transaction at a time, matching the
//! reference system's coarse embedded single-writer mode (spec.md §5).

use std::path::Path;
use std::sync::Mutex;

use crate::error::SmallError;
use crate::pager::{Pager, Transaction};
use crate::types::{Pgno, SmallResult};
use crate::vardir;

/// Options for [`Database::open`]. Both files are created if absent.
pub struct OpenOptions {
    pub data_path: std::path::PathBuf,
    pub wal_path: std::path::PathBuf,
}

impl OpenOptions {
    pub fn new<P: AsRef<Path>>(data_path: P, wal_path: P) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            wal_path: wal_path.as_ref().to_path_buf(),
        }
    }
}

/// A variable's directory-assigned handle: its `RPT_ROOT` page number.
pub type VarId = Pgno;

pub struct Database {
    pager: Pager,
    current_txn: Mutex<Option<Transaction>>,
}

impl Database {
    pub fn open(opts: OpenOptions) -> SmallResult<Self> {
        let pager = Pager::open(opts.data_path, opts.wal_path)?;
        Ok(Self {
            pager,
            current_txn: Mutex::new(None),
        })
    }

    /// Flush the WAL and drop the handle. There is nothing further to
    /// persist: every committed mutation is already durable.
    pub fn close(self) -> SmallResult<()> {
        self.pager.wal().flush()
    }

    fn txn(&self) -> SmallResult<Transaction> {
        self.current_txn
            .lock()
            .unwrap()
            .ok_or_else(|| SmallError::invalid_argument("no active transaction"))
    }

    pub fn begin_txn(&self) -> SmallResult<()> {
        let mut slot = self.current_txn.lock().unwrap();
        if slot.is_some() {
            return Err(SmallError::invalid_argument("transaction already active"));
        }
        *slot = Some(self.pager.begin_txn()?);
        Ok(())
    }

    pub fn commit(&self) -> SmallResult<()> {
        let txn = self.txn()?;
        self.pager.commit(txn)?;
        *self.current_txn.lock().unwrap() = None;
        Ok(())
    }

    pub fn rollback(&self) -> SmallResult<()> {
        let txn = self.txn()?;
        self.pager.rollback(txn)?;
        *self.current_txn.lock().unwrap() = None;
        Ok(())
    }

    pub fn new_variable(&self, name: &[u8], type_bytes: &[u8]) -> SmallResult<VarId> {
        let txn = self.txn()?;
        vardir::new_variable(&self.pager, txn, name, type_bytes)
    }

    pub fn delete_variable(&self, name: &[u8]) -> SmallResult<()> {
        let txn = self.txn()?;
        let root = vardir::delete(&self.pager, txn, name)?;
        self.pager.delete_and_release(txn, root)
    }

    /// Resolve `name` to its `VarId` and stored type bytes, without
    /// requiring an active transaction (a pure read of committed state).
    pub fn lookup(&self, name: &[u8]) -> SmallResult<(VarId, Vec<u8>)> {
        let info = vardir::get(&self.pager, name)?;
        Ok((info.root, info.type_bytes))
    }

    pub fn insert(&self, id: VarId, src: &[u8], bofst: u64, size: usize, nelem: usize) -> SmallResult<()> {
        let txn = self.txn()?;
        if src.len() < size * nelem {
            return Err(SmallError::invalid_argument("src shorter than size * nelem"));
        }
        crate::rptree::insert(&self.pager, txn, id, bofst, &src[..size * nelem])
    }

    pub fn write(&self, id: VarId, src: &[u8], size: usize, bstart: u64, stride: usize, nelems: usize) -> SmallResult<()> {
        let txn = self.txn()?;
        crate::rptree::write(&self.pager, txn, id, bstart, size, stride, nelems, src)
    }

    pub fn read(&self, id: VarId, dest: &mut [u8], size: usize, bstart: u64, stride: usize, nelems: usize) -> SmallResult<usize> {
        crate::rptree::read(&self.pager, id, bstart, size, stride, nelems, dest)
    }

    pub fn remove(&self, id: VarId, dest: Option<&mut [u8]>, size: usize, bstart: u64, stride: usize, nelems: usize) -> SmallResult<usize> {
        let txn = self.txn()?;
        crate::rptree::remove(&self.pager, txn, id, bstart, size, stride, nelems, dest)
    }

    /// Current total byte size of the variable's tree (spec.md §8 testable
    /// property 9).
    pub fn fsize(&self, id: VarId) -> SmallResult<u64> {
        let frame = self.pager.get(id, crate::page::PageType::RptRoot.bit())?;
        match &*frame.read().unwrap() {
            crate::page::Page::RptRoot(r) => Ok(r.total_size),
            _ => unreachable!(),
        }
    }

    pub fn checkpoint(&self) -> SmallResult<()> {
        self.pager.checkpoint().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::open(OpenOptions::new(dir.path().join("d"), dir.path().join("w"))).unwrap()
    }

    #[test]
    fn create_insert_read_roundtrip() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        db.begin_txn().unwrap();
        let id = db.new_variable(b"v1", b"U32").unwrap();
        db.insert(id, b"abcdefgh", 0, 4, 2).unwrap();
        db.commit().unwrap();

        let mut buf = [0u8; 8];
        let n = db.read(id, &mut buf, 4, 0, 4, 2).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf, b"abcdefgh");
        assert_eq!(db.fsize(id).unwrap(), 8);
    }

    #[test]
    fn delete_variable_then_lookup_fails() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        db.begin_txn().unwrap();
        db.new_variable(b"v1", b"U32").unwrap();
        db.commit().unwrap();

        db.begin_txn().unwrap();
        db.delete_variable(b"v1").unwrap();
        db.commit().unwrap();

        assert!(db.lookup(b"v1").is_err());
    }

    #[test]
    fn remove_shrinks_fsize() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        db.begin_txn().unwrap();
        let id = db.new_variable(b"v1", b"U32").unwrap();
        db.insert(id, b"0123456789", 0, 1, 10).unwrap();
        let n = db.remove(id, None, 1, 0, 1, 3).unwrap();
        db.commit().unwrap();

        assert_eq!(n, 3);
        assert_eq!(db.fsize(id).unwrap(), 7);
    }

    #[test]
    fn operations_without_txn_are_rejected() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        assert!(db.new_variable(b"v1", b"U32").is_err());
    }
}
