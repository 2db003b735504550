//! The pager: page cache, WAL-first writes, transaction lifecycle, and
//! on-disk page allocation (spec.md §3/§4.5 component 7).
//!
//! Every mutation to a page goes through [`Pager::write_page`], which logs
//! an `UPDATE` record before the in-memory page is changed (write-ahead
//! rule) and, under the default `aries_steal` policy, writes the page's
//! bytes back to the data file immediately. `aries_no_steal` defers that
//! writeback to commit time instead. `aries_force` walks a committing
//! transaction's undo chain and flushes every page it touched before the
//! commit returns; the default `aries_no_force` leaves that to recovery.

pub mod buffer_pool;
pub mod txn;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::SmallError;
use crate::io::SmallFile;
use crate::page::{Page, PageType, PAGE_SIZE};
use crate::types::{Lsn, Pgno, SmallResult, Txid, LSN_NULL, PGNO_NULL};
use crate::wal::{Record, WalFile};

pub use buffer_pool::{BufferPool, FrameRef};
pub use txn::{Transaction, TxnEntry, TxnState};

pub struct Pager {
    data_file: Mutex<SmallFile>,
    wal: Arc<WalFile>,
    pool: BufferPool,
    txns: RwLock<HashMap<Txid, TxnEntry>>,
    /// recLSN per dirty page (spec.md §4.6): the LSN of the oldest update
    /// not yet reflected on disk.
    dpt: RwLock<HashMap<Pgno, Lsn>>,
    next_tid: AtomicU64,
    num_pages: AtomicU64,
}

fn steals() -> bool {
    !cfg!(feature = "aries_no_steal")
}

fn forces() -> bool {
    cfg!(feature = "aries_force")
}

impl Pager {
    /// Open (or create) the data file at `data_path` and the WAL at
    /// `wal_path`. A freshly created store is bootstrapped with `ROOT`
    /// (page 0) and `VAR_HASH` (page 1) written directly, unlogged: there
    /// is nothing to recover to if the store never existed before.
    pub fn open<P: AsRef<Path>>(data_path: P, wal_path: P) -> SmallResult<Self> {
        let mut data_file = SmallFile::open(data_path)?;
        let wal = Arc::new(WalFile::open(wal_path)?);
        let existing_len = data_file.len()?;
        let num_pages = existing_len / PAGE_SIZE as u64;

        let pager = Self {
            data_file: Mutex::new(data_file),
            wal,
            pool: BufferPool::new(),
            txns: RwLock::new(HashMap::new()),
            dpt: RwLock::new(HashMap::new()),
            next_tid: AtomicU64::new(1),
            num_pages: AtomicU64::new(num_pages),
        };

        if num_pages == 0 {
            pager.bootstrap()?;
        } else {
            crate::recovery::recover(&pager)?;
        }
        Ok(pager)
    }

    fn bootstrap(&self) -> SmallResult {
        let root = Page::Root(crate::page::RootPage::new_empty());
        let var_hash = Page::VarHash(crate::page::VarHashPage::new_empty());
        self.force_write_new_page(root)?;
        self.force_write_new_page(var_hash)?;
        Ok(())
    }

    fn force_write_new_page(&self, page: Page) -> SmallResult<()> {
        let pgno = page.pgno();
        let bytes = page.encode();
        {
            let mut f = self.data_file.lock().unwrap();
            f.set_len((pgno + 1) * PAGE_SIZE as u64)?;
            f.write_at(pgno * PAGE_SIZE as u64, &bytes)?;
            f.flush()?;
        }
        self.num_pages.fetch_max(pgno + 1, Ordering::SeqCst);
        self.pool.insert(page);
        Ok(())
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages.load(Ordering::SeqCst)
    }

    pub fn wal(&self) -> &Arc<WalFile> {
        &self.wal
    }

    /// `ROOT.master_lsn`: the LSN recovery should scan forward from.
    pub(crate) fn root_master_lsn(&self) -> SmallResult<Lsn> {
        let frame = self.load_page(crate::page::root::ROOT_PGNO)?;
        match &*frame.read().unwrap() {
            Page::Root(r) => Ok(r.master_lsn),
            _ => unreachable!(),
        }
    }

    pub(crate) fn current_page_lsn(&self, pgno: Pgno) -> SmallResult<Lsn> {
        Ok(self.load_page(pgno)?.read().unwrap().lsn())
    }

    // -- transaction lifecycle -------------------------------------------

    pub fn begin_txn(&self) -> SmallResult<Transaction> {
        let tid = self.next_tid.fetch_add(1, Ordering::SeqCst);
        let lsn = self.wal.append(&Record::Begin { tid })?;
        let mut entry = TxnEntry::new();
        entry.last_lsn = lsn;
        self.txns.write().unwrap().insert(tid, entry);
        Ok(Transaction::new(tid))
    }

    fn last_lsn(&self, tid: Txid) -> SmallResult<Lsn> {
        self.txns
            .read()
            .unwrap()
            .get(&tid)
            .map(|e| e.last_lsn)
            .ok_or_else(|| SmallError::invalid_argument("unknown transaction"))
    }

    fn set_last_lsn(&self, tid: Txid, lsn: Lsn) {
        if let Some(e) = self.txns.write().unwrap().get_mut(&tid) {
            e.last_lsn = lsn;
        }
    }

    /// Flush the WAL, append a `COMMIT` record, optionally force this
    /// transaction's dirty pages to disk, then append `END` and retire the
    /// transaction.
    pub fn commit(&self, txn: Transaction) -> SmallResult<()> {
        self.wal.flush()?;
        let prev = self.last_lsn(txn.tid)?;
        let commit_lsn = self.wal.append(&Record::Commit {
            tid: txn.tid,
            prev_lsn: prev,
        })?;
        self.wal.flush()?;
        self.set_last_lsn(txn.tid, commit_lsn);

        if forces() {
            for pgno in self.touched_pages(txn.tid, prev)? {
                self.writeback(pgno)?;
            }
        }

        let end_lsn = self.wal.append(&Record::End {
            tid: txn.tid,
            prev_lsn: commit_lsn,
        })?;
        self.wal.flush()?;
        self.set_last_lsn(txn.tid, end_lsn);
        self.txns.write().unwrap().remove(&txn.tid);
        Ok(())
    }

    /// Undo every `UPDATE`/`CLR` this transaction logged, writing a `CLR`
    /// for each one as it is undone, then append `END`.
    pub fn rollback(&self, txn: Transaction) -> SmallResult<()> {
        let mut cursor = self.last_lsn(txn.tid)?;
        loop {
            let record = self
                .wal
                .read_at(cursor)?
                .ok_or_else(|| SmallError::corrupt("missing WAL record during rollback"))?;
            match record {
                Record::Begin { .. } => break,
                Record::Update {
                    prev_lsn,
                    pgno,
                    undo_image,
                    ..
                } => {
                    self.apply_image(pgno, &undo_image)?;
                    let clr_lsn = self.wal.append(&Record::Clr {
                        tid: txn.tid,
                        prev_lsn: self.last_lsn(txn.tid)?,
                        pgno,
                        undo_next_lsn: prev_lsn,
                        redo_image: undo_image,
                    })?;
                    self.set_last_lsn(txn.tid, clr_lsn);
                    cursor = prev_lsn;
                }
                Record::Clr {
                    undo_next_lsn,
                    pgno,
                    ..
                } => {
                    // Runtime rollback does not itself emit nested CLRs for
                    // CLRs (only recovery's undo pass revisits them); just
                    // follow the chain back.
                    let _ = pgno;
                    cursor = undo_next_lsn;
                }
                Record::Commit { prev_lsn, .. } | Record::End { prev_lsn, .. } => {
                    cursor = prev_lsn;
                }
                Record::CkptBegin | Record::CkptEnd { .. } => {
                    return Err(SmallError::corrupt("checkpoint record in txn chain"));
                }
            }
        }
        let prev = self.last_lsn(txn.tid)?;
        let end_lsn = self.wal.append(&Record::End {
            tid: txn.tid,
            prev_lsn: prev,
        })?;
        self.wal.flush()?;
        self.set_last_lsn(txn.tid, end_lsn);
        self.txns.write().unwrap().remove(&txn.tid);
        Ok(())
    }

    /// Walk the undo chain from `from_lsn` back to (not including) `stop_lsn`
    /// (the transaction's pre-commit `last_lsn`), collecting distinct pgnos.
    fn touched_pages(&self, _tid: Txid, stop_lsn: Lsn) -> SmallResult<Vec<Pgno>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut cursor = stop_lsn;
        loop {
            if cursor == LSN_NULL {
                break;
            }
            let record = self
                .wal
                .read_at(cursor)?
                .ok_or_else(|| SmallError::corrupt("missing WAL record"))?;
            match record {
                Record::Begin { .. } => break,
                Record::Update { prev_lsn, pgno, .. } | Record::Clr { prev_lsn, pgno, .. } => {
                    if seen.insert(pgno) {
                        out.push(pgno);
                    }
                    cursor = prev_lsn;
                }
                _ => break,
            }
        }
        Ok(out)
    }

    /// Write a page image directly into its frame, bypassing WAL logging.
    /// Used by recovery's redo/undo passes and by runtime rollback, both of
    /// which log through a different path (or not at all, for redo).
    pub(crate) fn apply_image(&self, pgno: Pgno, image: &[u8]) -> SmallResult<()> {
        let page = Page::decode(image)?;
        let frame = self.load_page(pgno)?;
        *frame.write().unwrap() = page;
        if steals() {
            self.writeback(pgno)?;
        } else {
            self.dpt
                .write()
                .unwrap()
                .entry(pgno)
                .or_insert_with(|| self.wal.len().unwrap_or(LSN_NULL));
        }
        Ok(())
    }

    // -- page access -------------------------------------------------------

    pub(crate) fn load_page(&self, pgno: Pgno) -> SmallResult<FrameRef> {
        if let Some(frame) = self.pool.peek(pgno) {
            return Ok(frame);
        }
        BufferPool::validate_pgno(pgno, self.num_pages())?;
        let bytes = {
            let mut f = self.data_file.lock().unwrap();
            f.read_at(pgno * PAGE_SIZE as u64, PAGE_SIZE)?
        };
        let page = Page::decode(&bytes)?;
        Ok(self.pool.insert(page))
    }

    /// Read-oriented access: returns the cached frame after validating its
    /// type is one of `expected_types`.
    pub fn get(&self, pgno: Pgno, expected_types: u32) -> SmallResult<FrameRef> {
        let frame = self.load_page(pgno)?;
        frame.read().unwrap().check_type(expected_types)?;
        Ok(frame)
    }

    /// Mutate a page transactionally: logs an `UPDATE` record with the
    /// before/after images, then applies `mutate` to the live frame.
    pub fn write_page<F>(
        &self,
        txn: Transaction,
        pgno: Pgno,
        expected_types: u32,
        mutate: F,
    ) -> SmallResult<()>
    where
        F: FnOnce(&mut Page) -> SmallResult<()>,
    {
        let frame = self.load_page(pgno)?;
        let mut guard = frame.write().unwrap();
        guard.check_type(expected_types)?;
        let undo_image = guard.encode();
        mutate(&mut guard)?;
        let prev_lsn = self.last_lsn(txn.tid)?;
        let redo_image = guard.encode();
        let lsn = self.wal.append(&Record::Update {
            tid: txn.tid,
            prev_lsn,
            pgno,
            undo_image,
            redo_image,
        })?;
        guard.set_lsn(lsn);
        self.set_last_lsn(txn.tid, lsn);
        self.dpt.write().unwrap().entry(pgno).or_insert(lsn);
        drop(guard);
        if steals() {
            self.writeback(pgno)?;
        }
        Ok(())
    }

    /// Allocate a page of `page_type`: reuse the tombstone chain head if
    /// one exists, otherwise extend the data file.
    pub fn new_page(&self, txn: Transaction, page_type: PageType) -> SmallResult<FrameRef> {
        let reused = self.pop_tombstone(txn)?;
        // A page reused from the free chain already has real tombstone
        // bytes on disk; a page from raw file growth has only zero bytes
        // there, which is not a meaningful undo image, so seed its cache
        // entry with an explicit empty tombstone before it is overwritten.
        let pgno = match reused {
            Some(pgno) => pgno,
            None => {
                let pgno = self.grow_file()?;
                self.pool
                    .insert(Page::Tombstone(crate::page::TombstonePage::new_empty(pgno)));
                pgno
            }
        };

        let blank = blank_page(pgno, page_type);
        let frame = self.load_page(pgno)?;
        {
            let mut guard = frame.write().unwrap();
            let undo_image = guard.encode();
            *guard = blank;
            let prev_lsn = self.last_lsn(txn.tid)?;
            let redo_image = guard.encode();
            let lsn = self.wal.append(&Record::Update {
                tid: txn.tid,
                prev_lsn,
                pgno,
                undo_image,
                redo_image,
            })?;
            guard.set_lsn(lsn);
            self.set_last_lsn(txn.tid, lsn);
            self.dpt.write().unwrap().entry(pgno).or_insert(lsn);
        }
        if steals() {
            self.writeback(pgno)?;
        }
        Ok(frame)
    }

    fn pop_tombstone(&self, txn: Transaction) -> SmallResult<Option<Pgno>> {
        let root_frame = self.get(crate::page::root::ROOT_PGNO, PageType::Root.bit())?;
        let head = match &*root_frame.read().unwrap() {
            Page::Root(r) => r.first_tmbst,
            _ => unreachable!(),
        };
        if head == PGNO_NULL {
            return Ok(None);
        }
        let next = match &*self
            .get(head, PageType::Tombstone.bit())?
            .read()
            .unwrap()
        {
            Page::Tombstone(t) => t.next,
            _ => unreachable!(),
        };
        self.write_page(txn, crate::page::root::ROOT_PGNO, PageType::Root.bit(), |p| {
            if let Page::Root(r) = p {
                r.first_tmbst = next;
            }
            Ok(())
        })?;
        Ok(Some(head))
    }

    fn grow_file(&self) -> SmallResult<Pgno> {
        let pgno = self.num_pages.fetch_add(1, Ordering::SeqCst);
        let f = self.data_file.lock().unwrap();
        f.set_len((pgno + 1) * PAGE_SIZE as u64)?;
        Ok(pgno)
    }

    /// Release a page back onto the free chain as a `TOMBSTONE`, and drop
    /// it from the cache so a later `new_page` reusing the `pgno` doesn't
    /// observe stale content through a stray `Arc`.
    pub fn delete_and_release(&self, txn: Transaction, pgno: Pgno) -> SmallResult<()> {
        let root_frame = self.get(crate::page::root::ROOT_PGNO, PageType::Root.bit())?;
        let old_head = match &*root_frame.read().unwrap() {
            Page::Root(r) => r.first_tmbst,
            _ => unreachable!(),
        };
        self.write_page(txn, pgno, u32::MAX, |p| {
            *p = Page::Tombstone(crate::page::TombstonePage::new(pgno, old_head));
            Ok(())
        })?;
        self.write_page(txn, crate::page::root::ROOT_PGNO, PageType::Root.bit(), |p| {
            if let Page::Root(r) = p {
                r.first_tmbst = pgno;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Write a frame's current bytes to the data file and clear its dpt
    /// entry (the page is clean again).
    fn writeback(&self, pgno: Pgno) -> SmallResult<()> {
        let frame = self
            .pool
            .peek(pgno)
            .ok_or_else(|| SmallError::corrupt("writeback of uncached page"))?;
        let bytes = frame.read().unwrap().encode();
        {
            let mut f = self.data_file.lock().unwrap();
            f.write_at(pgno * PAGE_SIZE as u64, &bytes)?;
        }
        self.dpt.write().unwrap().remove(&pgno);
        Ok(())
    }

    /// Fuzzy checkpoint (spec.md §4.6 component 8): snapshot the active
    /// transaction table and dirty-page table into a `CKPT_END` record
    /// bracketed by `CKPT_BEGIN`, and record its LSN in `ROOT.master_lsn`.
    pub fn checkpoint(&self) -> SmallResult<Lsn> {
        let begin_lsn = self.wal.append(&Record::CkptBegin)?;
        let att: Vec<_> = self
            .txns
            .read()
            .unwrap()
            .iter()
            .map(|(tid, e)| (*tid, crate::wal::TxState::Active, e.last_lsn))
            .collect();
        let dpt: Vec<_> = self
            .dpt
            .read()
            .unwrap()
            .iter()
            .map(|(pgno, lsn)| (*pgno, *lsn))
            .collect();
        self.wal.append(&Record::CkptEnd { att, dpt })?;
        self.wal.flush()?;

        let root_frame = self.get(crate::page::root::ROOT_PGNO, PageType::Root.bit())?;
        {
            let mut guard = root_frame.write().unwrap();
            if let Page::Root(r) = &mut *guard {
                r.master_lsn = begin_lsn;
            }
        }
        self.writeback(crate::page::root::ROOT_PGNO)?;
        Ok(begin_lsn)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn dirty_page_table(&self) -> HashMap<Pgno, Lsn> {
        self.dpt.read().unwrap().clone()
    }

    pub fn active_txns(&self) -> HashMap<Txid, TxnEntry> {
        self.txns.read().unwrap().clone()
    }
}

fn blank_page(pgno: Pgno, page_type: PageType) -> Page {
    match page_type {
        PageType::Root => Page::Root(crate::page::RootPage::new_empty()),
        PageType::VarHash => Page::VarHash(crate::page::VarHashPage::new_empty()),
        PageType::VarHead => Page::VarHead(crate::page::VarHeadPage::new_empty(pgno)),
        PageType::VarTail => Page::VarTail(crate::page::VarTailPage::new_empty(pgno)),
        PageType::Inner => Page::Inner(crate::page::InnerPage::new_empty(pgno)),
        PageType::DataList => Page::DataList(crate::page::DataListPage::new_empty(pgno)),
        PageType::Tombstone => Page::Tombstone(crate::page::TombstonePage::new_empty(pgno)),
        PageType::RptRoot => Page::RptRoot(crate::page::RptRootPage::new_empty(pgno)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_pager(dir: &std::path::Path) -> Pager {
        Pager::open(dir.join("data.db"), dir.join("wal.log")).unwrap()
    }

    #[test]
    fn bootstrap_creates_root_and_var_hash() {
        let dir = tempdir().unwrap();
        let pager = open_pager(dir.path());
        assert_eq!(pager.num_pages(), 2);
        let root = pager.get(0, PageType::Root.bit()).unwrap();
        match &*root.read().unwrap() {
            Page::Root(r) => assert_eq!(r.first_tmbst, PGNO_NULL),
            _ => panic!("wrong type"),
        }
    }

    #[test]
    fn write_then_commit_persists() {
        let dir = tempdir().unwrap();
        let pager = open_pager(dir.path());
        let txn = pager.begin_txn().unwrap();
        let frame = pager.new_page(txn, PageType::DataList).unwrap();
        let pgno = frame.read().unwrap().pgno();
        pager
            .write_page(txn, pgno, PageType::DataList.bit(), |p| {
                if let Page::DataList(d) = p {
                    d.used = 3;
                    d.payload[0] = 42;
                }
                Ok(())
            })
            .unwrap();
        pager.commit(txn).unwrap();

        let reopened = pager.get(pgno, PageType::DataList.bit()).unwrap();
        match &*reopened.read().unwrap() {
            Page::DataList(d) => assert_eq!(d.payload[0], 42),
            _ => panic!("wrong type"),
        }
    }

    #[test]
    fn rollback_restores_before_image() {
        let dir = tempdir().unwrap();
        let pager = open_pager(dir.path());
        let txn = pager.begin_txn().unwrap();
        let frame = pager.new_page(txn, PageType::DataList).unwrap();
        let pgno = frame.read().unwrap().pgno();
        pager.commit(txn).unwrap();

        let txn2 = pager.begin_txn().unwrap();
        pager
            .write_page(txn2, pgno, PageType::DataList.bit(), |p| {
                if let Page::DataList(d) = p {
                    d.payload[0] = 99;
                }
                Ok(())
            })
            .unwrap();
        pager.rollback(txn2).unwrap();

        let after = pager.get(pgno, PageType::DataList.bit()).unwrap();
        match &*after.read().unwrap() {
            Page::DataList(d) => assert_eq!(d.payload[0], 0),
            _ => panic!("wrong type"),
        }
    }

    #[test]
    fn delete_then_new_reuses_tombstone() {
        let dir = tempdir().unwrap();
        let pager = open_pager(dir.path());
        let txn = pager.begin_txn().unwrap();
        let frame = pager.new_page(txn, PageType::DataList).unwrap();
        let pgno = frame.read().unwrap().pgno();
        pager.delete_and_release(txn, pgno).unwrap();
        let before_pages = pager.num_pages();
        let reused = pager.new_page(txn, PageType::DataList).unwrap();
        assert_eq!(reused.read().unwrap().pgno(), pgno);
        assert_eq!(pager.num_pages(), before_pages);
        pager.commit(txn).unwrap();
    }
}
