//! Variable directory cursor (spec.md §4.9 component 11): resolves a
//! variable name to its `RPT_ROOT` page through `VAR_HASH`'s fixed bucket
//! array and a chain of `VAR_HEAD`/`VAR_TAIL` pages per bucket.

use crate::error::SmallError;
use crate::page::var_hash::{VAR_HASH_PGNO, NUM_BUCKETS};
use crate::page::var_record::{MAX_VSTR, VAR_HEAD_INLINE_CAP, VAR_TAIL_INLINE_CAP};
use crate::page::{Page, PageType};
use crate::pager::{Pager, Transaction};
use crate::types::{Pgno, SmallResult, PGNO_NULL};

/// A resolved variable record: its tree root and serialised type bytes.
pub struct VarInfo {
    pub root: Pgno,
    pub type_bytes: Vec<u8>,
}

/// Read the full `name ++ type` byte string for a `VAR_HEAD` chain.
fn read_full(pager: &Pager, head_pgno: Pgno) -> SmallResult<(u16, u16, Pgno, Vec<u8>)> {
    let frame = pager.get(head_pgno, PageType::VarHead.bit())?;
    let (name_len, type_len, root, mut tail, mut bytes) = match &*frame.read().unwrap() {
        Page::VarHead(h) => (h.name_len, h.type_len, h.root, h.tail, h.inline.clone()),
        _ => unreachable!(),
    };
    while tail != PGNO_NULL {
        let frame = pager.get(tail, PageType::VarTail.bit())?;
        let (next, inline) = match &*frame.read().unwrap() {
            Page::VarTail(t) => (t.next, t.inline.clone()),
            _ => unreachable!(),
        };
        bytes.extend_from_slice(&inline);
        tail = next;
    }
    Ok((name_len, type_len, root, bytes))
}

/// Walk the bucket chain starting at `head`, returning the pgno of the
/// `VAR_HEAD` whose stored name matches, plus the pgno of the chain
/// predecessor (`PGNO_NULL` if `head` itself matched).
fn find_in_chain(pager: &Pager, head: Pgno, name: &[u8]) -> SmallResult<Option<(Pgno, Pgno)>> {
    let mut prev = PGNO_NULL;
    let mut cur = head;
    while cur != PGNO_NULL {
        let (name_len, _type_len, _root, full) = read_full(pager, cur)?;
        if full.len() >= name_len as usize && &full[..name_len as usize] == name {
            return Ok(Some((cur, prev)));
        }
        let next = match &*pager.get(cur, PageType::VarHead.bit())?.read().unwrap() {
            Page::VarHead(h) => h.bucket_next,
            _ => unreachable!(),
        };
        prev = cur;
        cur = next;
    }
    Ok(None)
}

fn bucket_head(pager: &Pager, bucket: usize) -> SmallResult<Pgno> {
    let frame = pager.get(VAR_HASH_PGNO, PageType::VarHash.bit())?;
    match &*frame.read().unwrap() {
        Page::VarHash(h) => Ok(h.buckets[bucket]),
        _ => unreachable!(),
    }
}

fn set_bucket_head(pager: &Pager, txn: Transaction, bucket: usize, pgno: Pgno) -> SmallResult<()> {
    pager.write_page(txn, VAR_HASH_PGNO, PageType::VarHash.bit(), |p| {
        if let Page::VarHash(h) = p {
            h.buckets[bucket] = pgno;
        }
        Ok(())
    })
}

/// Split `data` into an inline head chunk and `VAR_TAIL`-sized overflow
/// chunks, writing the overflow chain and returning its head pgno.
fn write_overflow(pager: &Pager, txn: Transaction, rest: &[u8]) -> SmallResult<Pgno> {
    if rest.is_empty() {
        return Ok(PGNO_NULL);
    }
    let mut pgnos = Vec::new();
    for chunk in rest.chunks(VAR_TAIL_INLINE_CAP) {
        let frame = pager.new_page(txn, PageType::VarTail)?;
        let pgno = frame.read().unwrap().pgno();
        pager.write_page(txn, pgno, PageType::VarTail.bit(), |p| {
            if let Page::VarTail(t) = p {
                t.used = chunk.len() as u16;
                t.inline = chunk.to_vec();
            }
            Ok(())
        })?;
        pgnos.push(pgno);
    }
    for pair in pgnos.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        pager.write_page(txn, a, PageType::VarTail.bit(), |p| {
            if let Page::VarTail(t) = p {
                t.next = b;
            }
            Ok(())
        })?;
    }
    Ok(pgnos[0])
}

fn delete_chain_as_tombstones(pager: &Pager, txn: Transaction, head: Pgno) -> SmallResult<()> {
    let frame = pager.get(head, PageType::VarHead.bit())?;
    let mut tail = match &*frame.read().unwrap() {
        Page::VarHead(h) => h.tail,
        _ => unreachable!(),
    };
    pager.delete_and_release(txn, head)?;
    while tail != PGNO_NULL {
        let frame = pager.get(tail, PageType::VarTail.bit())?;
        let next = match &*frame.read().unwrap() {
            Page::VarTail(t) => t.next,
            _ => unreachable!(),
        };
        pager.delete_and_release(txn, tail)?;
        tail = next;
    }
    Ok(())
}

/// Create a new variable, failing if `name` already exists. Returns the
/// pgno of the freshly allocated `RPT_ROOT` page.
pub fn new_variable(pager: &Pager, txn: Transaction, name: &[u8], type_bytes: &[u8]) -> SmallResult<Pgno> {
    if name.len() > MAX_VSTR {
        return Err(SmallError::invalid_argument("variable name exceeds MAX_VSTR"));
    }
    let bucket = {
        let frame = pager.get(VAR_HASH_PGNO, PageType::VarHash.bit())?;
        match &*frame.read().unwrap() {
            Page::VarHash(h) => h.bucket_for(name),
            _ => unreachable!(),
        }
    };
    let head = bucket_head(pager, bucket)?;
    if find_in_chain(pager, head, name)?.is_some() {
        return Err(SmallError::invalid_argument("variable already exists"));
    }

    let root_frame = pager.new_page(txn, PageType::RptRoot)?;
    let root_pgno = root_frame.read().unwrap().pgno();

    let mut combined = Vec::with_capacity(name.len() + type_bytes.len());
    combined.extend_from_slice(name);
    combined.extend_from_slice(type_bytes);
    let (inline, rest) = if combined.len() <= VAR_HEAD_INLINE_CAP {
        (combined.as_slice(), &[][..])
    } else {
        combined.split_at(VAR_HEAD_INLINE_CAP)
    };
    let tail = write_overflow(pager, txn, rest)?;

    let head_frame = pager.new_page(txn, PageType::VarHead)?;
    let head_pgno = head_frame.read().unwrap().pgno();
    pager.write_page(txn, head_pgno, PageType::VarHead.bit(), |p| {
        if let Page::VarHead(h) = p {
            h.name_len = name.len() as u16;
            h.type_len = type_bytes.len() as u16;
            h.root = root_pgno;
            h.bucket_next = head;
            h.tail = tail;
            h.used = inline.len() as u16;
            h.inline = inline.to_vec();
        }
        Ok(())
    })?;
    set_bucket_head(pager, txn, bucket, head_pgno)?;

    Ok(root_pgno)
}

/// Resolve `name` to its stored `RPT_ROOT` pgno and type bytes.
pub fn get(pager: &Pager, name: &[u8]) -> SmallResult<VarInfo> {
    if name.len() > MAX_VSTR {
        return Err(SmallError::invalid_argument("variable name exceeds MAX_VSTR"));
    }
    let bucket = {
        let frame = pager.get(VAR_HASH_PGNO, PageType::VarHash.bit())?;
        match &*frame.read().unwrap() {
            Page::VarHash(h) => h.bucket_for(name),
            _ => unreachable!(),
        }
    };
    let head = bucket_head(pager, bucket)?;
    let (found, _prev) = find_in_chain(pager, head, name)?.ok_or_else(|| SmallError::invalid_argument("no such variable"))?;
    let (name_len, _type_len, root, full) = read_full(pager, found)?;
    Ok(VarInfo {
        root,
        type_bytes: full[name_len as usize..].to_vec(),
    })
}

/// Remove `name` from its bucket chain and tombstone its record pages.
/// Does not touch the variable's `RPT_ROOT` tree; callers free that
/// separately once its own pages are tombstoned.
pub fn delete(pager: &Pager, txn: Transaction, name: &[u8]) -> SmallResult<Pgno> {
    if name.len() > MAX_VSTR {
        return Err(SmallError::invalid_argument("variable name exceeds MAX_VSTR"));
    }
    let bucket = {
        let frame = pager.get(VAR_HASH_PGNO, PageType::VarHash.bit())?;
        match &*frame.read().unwrap() {
            Page::VarHash(h) => h.bucket_for(name),
            _ => unreachable!(),
        }
    };
    let head = bucket_head(pager, bucket)?;
    let (found, prev) = find_in_chain(pager, head, name)?.ok_or_else(|| SmallError::invalid_argument("no such variable"))?;
    let (root, next) = {
        let frame = pager.get(found, PageType::VarHead.bit())?;
        match &*frame.read().unwrap() {
            Page::VarHead(h) => (h.root, h.bucket_next),
            _ => unreachable!(),
        }
    };

    if prev == PGNO_NULL {
        set_bucket_head(pager, txn, bucket, next)?;
    } else {
        pager.write_page(txn, prev, PageType::VarHead.bit(), |p| {
            if let Page::VarHead(h) = p {
                h.bucket_next = next;
            }
            Ok(())
        })?;
    }
    delete_chain_as_tombstones(pager, txn, found)?;
    Ok(root)
}

#[allow(dead_code)]
const _ASSERT_BUCKETS: usize = NUM_BUCKETS;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_pager(dir: &tempfile::TempDir) -> Pager {
        Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap()
    }

    #[test]
    fn new_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let pager = open_pager(&dir);
        let txn = pager.begin_txn().unwrap();
        let root = new_variable(&pager, txn, b"x", b"f64").unwrap();
        pager.commit(txn).unwrap();

        let info = get(&pager, b"x").unwrap();
        assert_eq!(info.root, root);
        assert_eq!(info.type_bytes, b"f64");
    }

    #[test]
    fn duplicate_name_rejected() {
        let dir = tempdir().unwrap();
        let pager = open_pager(&dir);
        let txn = pager.begin_txn().unwrap();
        new_variable(&pager, txn, b"x", b"f64").unwrap();
        assert!(new_variable(&pager, txn, b"x", b"i32").is_err());
    }

    #[test]
    fn delete_removes_from_chain() {
        let dir = tempdir().unwrap();
        let pager = open_pager(&dir);
        let txn = pager.begin_txn().unwrap();
        new_variable(&pager, txn, b"a", b"f64").unwrap();
        new_variable(&pager, txn, b"b", b"f64").unwrap();
        pager.commit(txn).unwrap();

        let txn2 = pager.begin_txn().unwrap();
        delete(&pager, txn2, b"a").unwrap();
        pager.commit(txn2).unwrap();

        assert!(get(&pager, b"a").is_err());
        assert!(get(&pager, b"b").is_ok());
    }

    #[test]
    fn name_over_max_vstr_rejected() {
        let dir = tempdir().unwrap();
        let pager = open_pager(&dir);
        let txn = pager.begin_txn().unwrap();
        let long_name = vec![b'a'; MAX_VSTR + 1];
        assert!(new_variable(&pager, txn, &long_name, b"f64").is_err());
    }

    #[test]
    fn get_after_reopen_reads_correct_type_bytes() {
        // Regression test: a fresh `Pager` forces every page to decode from
        // disk instead of being served from the in-memory cache, which is
        // the only path that exercises `VarHeadPage::decode`'s trimming of
        // `inline` back down to its stored length.
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("d");
        let wal_path = dir.path().join("w");
        {
            let pager = Pager::open(&data_path, &wal_path).unwrap();
            let txn = pager.begin_txn().unwrap();
            new_variable(&pager, txn, b"x", b"f64").unwrap();
            pager.commit(txn).unwrap();
        }

        let pager = Pager::open(&data_path, &wal_path).unwrap();
        let info = get(&pager, b"x").unwrap();
        assert_eq!(info.type_bytes, b"f64");
    }

    #[test]
    fn overflowing_name_and_type_span_tail_pages() {
        let dir = tempdir().unwrap();
        let pager = open_pager(&dir);
        let txn = pager.begin_txn().unwrap();
        let name = vec![b'n'; VAR_HEAD_INLINE_CAP]; // forces type bytes into VAR_TAIL
        new_variable(&pager, txn, &name, b"f64").unwrap();
        pager.commit(txn).unwrap();

        let info = get(&pager, &name).unwrap();
        assert_eq!(info.type_bytes, b"f64");
    }
}
