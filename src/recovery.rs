//! ARIES-style crash recovery (spec.md §4.6 component 8): analysis, redo,
//! and undo passes run once at `Pager::open` whenever the store already
//! existed. Recovery itself is logged (the undo pass writes real `CLR`s),
//! so a crash during recovery is handled by simply running recovery again.

use std::collections::HashMap;

use crate::error::SmallError;
use crate::pager::Pager;
use crate::types::{Lsn, Pgno, SmallResult, Txid};
use crate::wal::{Record, TxState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoserState {
    Active,
    Committed,
}

struct AttEntry {
    state: LoserState,
    last_lsn: Lsn,
}

pub fn recover(pager: &Pager) -> SmallResult<()> {
    let master_lsn = pager.root_master_lsn()?;
    let (att, dpt) = analyze(pager, master_lsn)?;
    redo(pager, &dpt)?;
    undo(pager, att)?;
    Ok(())
}

fn analyze(pager: &Pager, master_lsn: Lsn) -> SmallResult<(HashMap<Txid, AttEntry>, HashMap<Pgno, Lsn>)> {
    let mut att: HashMap<Txid, AttEntry> = HashMap::new();
    let mut dpt: HashMap<Pgno, Lsn> = HashMap::new();

    for (lsn, record) in pager.wal().scan_from(master_lsn)? {
        match record {
            Record::CkptBegin => {}
            Record::CkptEnd { att: seed_att, dpt: seed_dpt } => {
                for (tid, state, last_lsn) in seed_att {
                    let state = match state {
                        TxState::Active => LoserState::Active,
                        TxState::Committed => LoserState::Committed,
                    };
                    att.insert(tid, AttEntry { state, last_lsn });
                }
                for (pgno, rec_lsn) in seed_dpt {
                    dpt.entry(pgno).or_insert(rec_lsn);
                }
            }
            Record::Begin { tid } => {
                att.insert(
                    tid,
                    AttEntry {
                        state: LoserState::Active,
                        last_lsn: lsn,
                    },
                );
            }
            Record::Update { tid, pgno, .. } | Record::Clr { tid, pgno, .. } => {
                dpt.entry(pgno).or_insert(lsn);
                att.entry(tid)
                    .or_insert(AttEntry {
                        state: LoserState::Active,
                        last_lsn: lsn,
                    })
                    .last_lsn = lsn;
            }
            Record::Commit { tid, .. } => {
                if let Some(e) = att.get_mut(&tid) {
                    e.state = LoserState::Committed;
                }
            }
            Record::End { tid, .. } => {
                att.remove(&tid);
            }
        }
    }

    Ok((att, dpt))
}

fn redo(pager: &Pager, dpt: &HashMap<Pgno, Lsn>) -> SmallResult<()> {
    let start = match dpt.values().min() {
        Some(lsn) => *lsn,
        None => return Ok(()),
    };
    for (lsn, record) in pager.wal().scan_from(start)? {
        let (pgno, redo_image) = match record {
            Record::Update { pgno, redo_image, .. } => (pgno, redo_image),
            Record::Clr { pgno, redo_image, .. } => (pgno, redo_image),
            _ => continue,
        };
        let rec_lsn = match dpt.get(&pgno) {
            Some(rec_lsn) => *rec_lsn,
            None => continue,
        };
        if rec_lsn > lsn {
            continue;
        }
        if pager.current_page_lsn(pgno)? >= lsn {
            continue;
        }
        pager.apply_image(pgno, &redo_image)?;
    }
    Ok(())
}

fn undo(pager: &Pager, att: HashMap<Txid, AttEntry>) -> SmallResult<()> {
    let mut cursor: HashMap<Txid, Lsn> = att
        .iter()
        .filter(|(_, e)| e.state == LoserState::Active)
        .map(|(tid, e)| (*tid, e.last_lsn))
        .collect();
    let mut last_written: HashMap<Txid, Lsn> = cursor.clone();

    while !cursor.is_empty() {
        let (&tid, &lsn) = cursor
            .iter()
            .max_by_key(|(_, &lsn)| lsn)
            .expect("non-empty cursor map");

        let record = pager
            .wal()
            .read_at(lsn)?
            .ok_or_else(|| SmallError::corrupt("missing WAL record during undo"))?;

        match record {
            Record::Begin { .. } => {
                let prev = last_written[&tid];
                pager.wal().append(&Record::End { tid, prev_lsn: prev })?;
                cursor.remove(&tid);
                last_written.remove(&tid);
            }
            Record::Update {
                prev_lsn,
                pgno,
                undo_image,
                ..
            } => {
                let clr_lsn = pager.wal().append(&Record::Clr {
                    tid,
                    prev_lsn: last_written[&tid],
                    pgno,
                    undo_next_lsn: prev_lsn,
                    redo_image: undo_image.clone(),
                })?;
                pager.apply_image(pgno, &undo_image)?;
                last_written.insert(tid, clr_lsn);
                cursor.insert(tid, prev_lsn);
            }
            Record::Clr { undo_next_lsn, .. } => {
                cursor.insert(tid, undo_next_lsn);
            }
            Record::Commit { .. } | Record::End { .. } | Record::CkptBegin | Record::CkptEnd { .. } => {
                return Err(SmallError::corrupt("unexpected record type in undo chain"));
            }
        }
    }
    pager.wal().flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;
    use tempfile::tempdir;

    #[test]
    fn crash_before_commit_leaves_pages_as_tombstones_on_recovery() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("data.db");
        let wal_path = dir.path().join("wal.log");

        {
            let pager = Pager::open(&data_path, &wal_path).unwrap();
            let txn = pager.begin_txn().unwrap();
            for _ in 0..5 {
                pager.new_page(txn, PageType::DataList).unwrap();
            }
            pager.wal().flush().unwrap();
            // No commit: simulate a crash by dropping the pager here.
        }

        let reopened = Pager::open(&data_path, &wal_path).unwrap();
        for pgno in 2..7 {
            let frame = reopened.get(pgno, PageType::Tombstone.bit()).unwrap();
            assert!(matches!(&*frame.read().unwrap(), crate::page::Page::Tombstone(_)));
        }
    }

    #[test]
    fn crash_after_commit_preserves_committed_bytes() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("data.db");
        let wal_path = dir.path().join("wal.log");
        let pgno;

        {
            let pager = Pager::open(&data_path, &wal_path).unwrap();
            let txn = pager.begin_txn().unwrap();
            let frame = pager.new_page(txn, PageType::DataList).unwrap();
            pgno = frame.read().unwrap().pgno();
            pager
                .write_page(txn, pgno, PageType::DataList.bit(), |p| {
                    if let crate::page::Page::DataList(d) = p {
                        d.payload[0] = 7;
                    }
                    Ok(())
                })
                .unwrap();
            pager.commit(txn).unwrap();
        }

        let reopened = Pager::open(&data_path, &wal_path).unwrap();
        let frame = reopened.get(pgno, PageType::DataList.bit()).unwrap();
        match &*frame.read().unwrap() {
            crate::page::Page::DataList(d) => assert_eq!(d.payload[0], 7),
            _ => panic!("wrong type"),
        }
    }
}
