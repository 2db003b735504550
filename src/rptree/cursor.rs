//! B+ tree cursor operations (spec.md §4.7.3 component 10): `insert`,
//! `write`, `read`, `remove` over an `RPT_ROOT`-rooted tree.
//!
//! `insert` descends to the target leaf, splices bytes in, and — if that
//! overflows the leaf — splits it and bubbles the new sibling up through
//! [`NodeUpdates`], splitting ancestor inner nodes in turn exactly as
//! spec.md §4.7.2 describes (one new right sibling per split, committed
//! before the parent's own rewrite). `write`/`read` never change tree
//! shape so they walk the leaf chain directly. `remove` compacts each
//! touched leaf in place, propagates the size delta up its ancestor path
//! by name (`propagate_delta`), and then rebalances: any leaf left below
//! the half-full threshold is merged with a sibling (or has bytes shifted
//! from one) found via the leaf's own `prev`/`next` pointers, mirroring
//! §4.7.2's "merge with an in-hand sibling, else redistribute" step; a
//! fully-merged sibling is unlinked from its parent, which in turn
//! rebalances against *its* sibling inner node the same way, cascading up
//! to a root collapse (single remaining child becomes the new root, an
//! emptied root becomes `PGNO_NULL`) exactly as `wrap_as_root` already does
//! the reverse for inserts.

use crate::error::SmallError;
use crate::page::data_list::CAPACITY;
use crate::page::inner::{InnerEntry, M};
use crate::page::{Page, PageType};
use crate::pager::{Pager, Transaction};
use crate::types::{Pgno, SmallResult, PGNO_NULL};

use super::node;
use super::node_updates::{NodeUpdates, PivotUpdate, SiblingUpdate};

// -- insert ------------------------------------------------------------

pub fn insert(pager: &Pager, txn: Transaction, rpt_root: Pgno, bofst: u64, data: &[u8]) -> SmallResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let root_frame = pager.get(rpt_root, PageType::RptRoot.bit())?;
    let top = match &*root_frame.read().unwrap() {
        Page::RptRoot(r) => r.top,
        _ => unreachable!(),
    };

    let new_top = if top == PGNO_NULL {
        if bofst != 0 {
            return Err(SmallError::invalid_argument("insert offset past end of empty tree"));
        }
        build_leaf_chain(pager, txn, data)?
    } else {
        let updates = insert_at(pager, txn, top, bofst, data)?;
        let mut entries = Vec::new();
        if let Some(piv) = updates.pivot {
            entries.push((piv.pgno, piv.new_size));
        }
        let mut pending = updates.right;
        while let Some(su) = pending.consume() {
            entries.push((su.pgno, su.new_size));
        }
        wrap_as_root(pager, txn, entries)?
    };

    pager.write_page(txn, rpt_root, PageType::RptRoot.bit(), |p| {
        if let Page::RptRoot(r) = p {
            r.top = new_top;
            r.total_size += data.len() as u64;
        }
        Ok(())
    })
}

fn insert_at(pager: &Pager, txn: Transaction, pgno: Pgno, bofst: u64, data: &[u8]) -> SmallResult<NodeUpdates> {
    if node::is_inner(pager, pgno)? {
        insert_inner(pager, txn, pgno, bofst, data)
    } else {
        insert_leaf(pager, txn, pgno, bofst, data)
    }
}

fn insert_leaf(pager: &Pager, txn: Transaction, pgno: Pgno, local_bofst: u64, data: &[u8]) -> SmallResult<NodeUpdates> {
    let frame = pager.get(pgno, PageType::DataList.bit())?;
    let (used, next, payload) = match &*frame.read().unwrap() {
        Page::DataList(d) => (d.used as usize, d.next, d.payload.clone()),
        _ => unreachable!(),
    };
    let local = local_bofst as usize;
    if local > used {
        return Err(SmallError::invalid_argument("insert offset past end of leaf"));
    }

    let mut combined = Vec::with_capacity(used + data.len());
    combined.extend_from_slice(&payload[..local]);
    combined.extend_from_slice(data);
    combined.extend_from_slice(&payload[local..used]);

    if combined.len() <= CAPACITY {
        pager.write_page(txn, pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.payload[..combined.len()].copy_from_slice(&combined);
                d.used = combined.len() as u16;
            }
            Ok(())
        })?;
        let mut nu = NodeUpdates::new();
        nu.set_pivot(PivotUpdate {
            pgno,
            new_size: combined.len() as u64,
            deleted: false,
        });
        return Ok(nu);
    }

    // Overflow: re-chunk across the current page and freshly allocated
    // siblings spliced into the leaf chain ahead of the old `next`.
    let mut chunks: Vec<&[u8]> = combined.chunks(CAPACITY).collect();
    let first = chunks.remove(0);
    pager.write_page(txn, pgno, PageType::DataList.bit(), |p| {
        if let Page::DataList(d) = p {
            d.payload[..first.len()].copy_from_slice(first);
            d.used = first.len() as u16;
        }
        Ok(())
    })?;

    let mut nu = NodeUpdates::new();
    nu.set_pivot(PivotUpdate {
        pgno,
        new_size: first.len() as u64,
        deleted: false,
    });

    let mut prev_pgno = pgno;
    for chunk in chunks {
        let frame = pager.new_page(txn, PageType::DataList)?;
        let new_pgno = frame.read().unwrap().pgno();
        pager.write_page(txn, new_pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.payload[..chunk.len()].copy_from_slice(chunk);
                d.used = chunk.len() as u16;
                d.prev = prev_pgno;
            }
            Ok(())
        })?;
        pager.write_page(txn, prev_pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.next = new_pgno;
            }
            Ok(())
        })?;
        nu.append_right(SiblingUpdate {
            pgno: new_pgno,
            new_size: chunk.len() as u64,
        });
        prev_pgno = new_pgno;
    }
    if next != PGNO_NULL {
        pager.write_page(txn, prev_pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.next = next;
            }
            Ok(())
        })?;
        pager.write_page(txn, next, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.prev = prev_pgno;
            }
            Ok(())
        })?;
    }
    let pending = nu.right.len();
    nu.right.observe(pending);
    Ok(nu)
}

fn insert_inner(pager: &Pager, txn: Transaction, pgno: Pgno, bofst: u64, data: &[u8]) -> SmallResult<NodeUpdates> {
    let frame = pager.get(pgno, PageType::Inner.bit())?;
    let (entries, next) = match &*frame.read().unwrap() {
        Page::Inner(p) => (p.entries.clone(), p.next),
        _ => unreachable!(),
    };
    let (idx, local_bofst) = choose_child(&entries, bofst);
    let child_pgno = entries[idx].leaf;
    let child_updates = insert_at(pager, txn, child_pgno, local_bofst, data)?;

    let mut new_entries = entries;
    if let Some(piv) = child_updates.pivot {
        new_entries[idx] = InnerEntry {
            key: piv.new_size,
            leaf: piv.pgno,
        };
    }
    let mut insert_pos = idx + 1;
    let mut pending = child_updates.right;
    while let Some(su) = pending.consume() {
        new_entries.insert(
            insert_pos,
            InnerEntry {
                key: su.new_size,
                leaf: su.pgno,
            },
        );
        insert_pos += 1;
    }

    if new_entries.len() <= M {
        let total: u64 = new_entries.iter().map(|e| e.key).sum();
        pager.write_page(txn, pgno, PageType::Inner.bit(), |p| {
            if let Page::Inner(ip) = p {
                ip.entries = new_entries.clone();
            }
            Ok(())
        })?;
        let mut nu = NodeUpdates::new();
        nu.set_pivot(PivotUpdate {
            pgno,
            new_size: total,
            deleted: false,
        });
        return Ok(nu);
    }

    split_inner(pager, txn, pgno, new_entries, next)
}

fn split_inner(
    pager: &Pager,
    txn: Transaction,
    pgno: Pgno,
    entries: Vec<InnerEntry>,
    old_next: Pgno,
) -> SmallResult<NodeUpdates> {
    let mid = entries.len() / 2;
    let left = entries[..mid].to_vec();
    let right = entries[mid..].to_vec();

    pager.write_page(txn, pgno, PageType::Inner.bit(), |p| {
        if let Page::Inner(ip) = p {
            ip.entries = left.clone();
        }
        Ok(())
    })?;
    let left_total: u64 = left.iter().map(|e| e.key).sum();

    let frame = pager.new_page(txn, PageType::Inner)?;
    let new_pgno = frame.read().unwrap().pgno();
    pager.write_page(txn, new_pgno, PageType::Inner.bit(), |p| {
        if let Page::Inner(ip) = p {
            ip.entries = right.clone();
            ip.prev = pgno;
            ip.next = old_next;
        }
        Ok(())
    })?;
    pager.write_page(txn, pgno, PageType::Inner.bit(), |p| {
        if let Page::Inner(ip) = p {
            ip.next = new_pgno;
        }
        Ok(())
    })?;
    if old_next != PGNO_NULL {
        pager.write_page(txn, old_next, PageType::Inner.bit(), |p| {
            if let Page::Inner(ip) = p {
                ip.prev = new_pgno;
            }
            Ok(())
        })?;
    }
    let right_total: u64 = right.iter().map(|e| e.key).sum();

    let mut nu = NodeUpdates::new();
    nu.set_pivot(PivotUpdate {
        pgno,
        new_size: left_total,
        deleted: false,
    });
    nu.append_right(SiblingUpdate {
        pgno: new_pgno,
        new_size: right_total,
    });
    nu.right.observe(1);
    Ok(nu)
}

fn wrap_as_root(pager: &Pager, txn: Transaction, entries: Vec<(Pgno, u64)>) -> SmallResult<Pgno> {
    if entries.len() == 1 {
        return Ok(entries[0].0);
    }
    build_layer_above(pager, txn, entries)
}

fn build_leaf_chain(pager: &Pager, txn: Transaction, data: &[u8]) -> SmallResult<Pgno> {
    if data.is_empty() {
        let frame = pager.new_page(txn, PageType::DataList)?;
        return Ok(frame.read().unwrap().pgno());
    }

    let mut leaves: Vec<(Pgno, u64)> = Vec::new();
    let mut prev_pgno = PGNO_NULL;
    for chunk in data.chunks(CAPACITY) {
        let frame = pager.new_page(txn, PageType::DataList)?;
        let pgno = frame.read().unwrap().pgno();
        pager.write_page(txn, pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.payload[..chunk.len()].copy_from_slice(chunk);
                d.used = chunk.len() as u16;
                d.prev = prev_pgno;
            }
            Ok(())
        })?;
        if prev_pgno != PGNO_NULL {
            pager.write_page(txn, prev_pgno, PageType::DataList.bit(), |p| {
                if let Page::DataList(d) = p {
                    d.next = pgno;
                }
                Ok(())
            })?;
        }
        leaves.push((pgno, chunk.len() as u64));
        prev_pgno = pgno;
    }
    build_layer_above(pager, txn, leaves)
}

/// Bulk-build one or more inner layers above `children` (leaves or inner
/// nodes), grouping at most `M` per node, until a single top pgno remains.
fn build_layer_above(pager: &Pager, txn: Transaction, children: Vec<(Pgno, u64)>) -> SmallResult<Pgno> {
    if children.len() == 1 {
        return Ok(children[0].0);
    }

    let mut nodes: Vec<(Pgno, u64)> = Vec::new();
    let mut prev_pgno = PGNO_NULL;
    for group in children.chunks(M) {
        let frame = pager.new_page(txn, PageType::Inner)?;
        let pgno = frame.read().unwrap().pgno();
        let total: u64 = group.iter().map(|(_, s)| *s).sum();
        let entries: Vec<InnerEntry> = group.iter().map(|(l, s)| InnerEntry { key: *s, leaf: *l }).collect();
        pager.write_page(txn, pgno, PageType::Inner.bit(), |p| {
            if let Page::Inner(ip) = p {
                ip.entries = entries.clone();
                ip.prev = prev_pgno;
            }
            Ok(())
        })?;
        if prev_pgno != PGNO_NULL {
            pager.write_page(txn, prev_pgno, PageType::Inner.bit(), |p| {
                if let Page::Inner(ip) = p {
                    ip.next = pgno;
                }
                Ok(())
            })?;
        }
        nodes.push((pgno, total));
        prev_pgno = pgno;
    }
    build_layer_above(pager, txn, nodes)
}

/// Translate an offset relative to `entries`' combined subtree into
/// `(child index, offset local to that child)`.
fn choose_child(entries: &[InnerEntry], bofst: u64) -> (usize, u64) {
    let mut acc = 0u64;
    for (i, e) in entries.iter().enumerate() {
        if bofst < acc + e.key || i == entries.len() - 1 {
            return (i, bofst - acc);
        }
        acc += e.key;
    }
    unreachable!("inner node with no entries")
}

fn locate_leaf(pager: &Pager, mut pgno: Pgno, mut offset: u64) -> SmallResult<(Pgno, u64)> {
    loop {
        let frame = pager.get(pgno, PageType::Inner.bit() | PageType::DataList.bit())?;
        let entries = match &*frame.read().unwrap() {
            Page::Inner(p) => Some(p.entries.clone()),
            Page::DataList(_) => None,
            _ => unreachable!(),
        };
        match entries {
            Some(entries) => {
                let (idx, local) = choose_child(&entries, offset);
                pgno = entries[idx].leaf;
                offset = local;
            }
            None => return Ok((pgno, offset)),
        }
    }
}

// -- read/write/remove ---------------------------------------------------

pub fn read(pager: &Pager, rpt_root: Pgno, bstart: u64, size: usize, stride: usize, nelems: usize, dest: &mut [u8]) -> SmallResult<usize> {
    let root_frame = pager.get(rpt_root, PageType::RptRoot.bit())?;
    let (top, total) = match &*root_frame.read().unwrap() {
        Page::RptRoot(r) => (r.top, r.total_size),
        _ => unreachable!(),
    };
    if top == PGNO_NULL {
        return Ok(0);
    }
    let mut nread = 0;
    for i in 0..nelems {
        let off = bstart + (i as u64) * (stride as u64);
        if off + size as u64 > total {
            break;
        }
        let (leaf, local) = locate_leaf(pager, top, off)?;
        copy_from_leaf_chain(pager, leaf, local, &mut dest[i * size..(i + 1) * size])?;
        nread += 1;
    }
    Ok(nread)
}

pub fn write(
    pager: &Pager,
    txn: Transaction,
    rpt_root: Pgno,
    bstart: u64,
    size: usize,
    stride: usize,
    nelems: usize,
    src: &[u8],
) -> SmallResult<()> {
    let root_frame = pager.get(rpt_root, PageType::RptRoot.bit())?;
    let (top, total) = match &*root_frame.read().unwrap() {
        Page::RptRoot(r) => (r.top, r.total_size),
        _ => unreachable!(),
    };
    if top == PGNO_NULL {
        if nelems > 0 {
            return Err(SmallError::invalid_argument("write to empty tree"));
        }
        return Ok(());
    }
    for i in 0..nelems {
        let off = bstart + (i as u64) * (stride as u64);
        if off + size as u64 > total {
            return Err(SmallError::invalid_argument("write out of range"));
        }
        let (leaf, local) = locate_leaf(pager, top, off)?;
        write_into_leaf_chain(pager, txn, leaf, local, &src[i * size..(i + 1) * size])?;
    }
    Ok(())
}

pub fn remove(
    pager: &Pager,
    txn: Transaction,
    rpt_root: Pgno,
    bstart: u64,
    size: usize,
    stride: usize,
    nelems: usize,
    mut dest: Option<&mut [u8]>,
) -> SmallResult<usize> {
    if size == 0 || stride < size {
        return Err(SmallError::invalid_argument("stride must be >= size"));
    }
    let root_frame = pager.get(rpt_root, PageType::RptRoot.bit())?;
    let (top, total0) = match &*root_frame.read().unwrap() {
        Page::RptRoot(r) => (r.top, r.total_size),
        _ => unreachable!(),
    };
    if top == PGNO_NULL {
        return Ok(0);
    }

    let gap = (stride - size) as u64;
    let mut total = total0;
    let mut top = top;
    let mut nremoved = 0usize;
    for i in 0..nelems {
        let off = bstart + (i as u64) * gap;
        if off + size as u64 > total {
            break;
        }
        let (leaf, local) = locate_leaf(pager, top, off)?;
        if let Some(d) = dest.as_deref_mut() {
            copy_from_leaf_chain(pager, leaf, local, &mut d[i * size..(i + 1) * size])?;
        }
        let deltas = delete_bytes_physically(pager, txn, leaf, local, size as u64)?;
        if node::is_inner(pager, top)? {
            for (leaf_pgno, delta) in &deltas {
                propagate_delta(pager, txn, top, *leaf_pgno, *delta)?;
            }
        }
        for (leaf_pgno, _) in &deltas {
            top = rebalance_leaf(pager, txn, top, *leaf_pgno)?;
        }
        total -= size as u64;
        nremoved += 1;
    }

    pager.write_page(txn, rpt_root, PageType::RptRoot.bit(), |p| {
        if let Page::RptRoot(r) = p {
            r.top = top;
            r.total_size = total;
        }
        Ok(())
    })?;
    Ok(nremoved)
}

fn copy_from_leaf_chain(pager: &Pager, mut pgno: Pgno, mut local: u64, out: &mut [u8]) -> SmallResult<()> {
    let mut filled = 0;
    while filled < out.len() {
        let frame = pager.get(pgno, PageType::DataList.bit())?;
        let (used, next, payload) = match &*frame.read().unwrap() {
            Page::DataList(d) => (d.used as usize, d.next, d.payload.clone()),
            _ => unreachable!(),
        };
        let lo = local as usize;
        let avail = used - lo;
        let take = avail.min(out.len() - filled);
        out[filled..filled + take].copy_from_slice(&payload[lo..lo + take]);
        filled += take;
        local = 0;
        if filled < out.len() {
            pgno = next;
            if pgno == PGNO_NULL {
                return Err(SmallError::corrupt("ran off end of leaf chain"));
            }
        }
    }
    Ok(())
}

fn write_into_leaf_chain(pager: &Pager, txn: Transaction, mut pgno: Pgno, mut local: u64, src: &[u8]) -> SmallResult<()> {
    let mut filled = 0;
    while filled < src.len() {
        let (used, next) = match &*pager.get(pgno, PageType::DataList.bit())?.read().unwrap() {
            Page::DataList(d) => (d.used as usize, d.next),
            _ => unreachable!(),
        };
        let lo = local as usize;
        let avail = used - lo;
        let take = avail.min(src.len() - filled);
        let chunk = &src[filled..filled + take];
        pager.write_page(txn, pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.payload[lo..lo + take].copy_from_slice(chunk);
            }
            Ok(())
        })?;
        filled += take;
        local = 0;
        if filled < src.len() {
            pgno = next;
            if pgno == PGNO_NULL {
                return Err(SmallError::corrupt("ran off end of leaf chain"));
            }
        }
    }
    Ok(())
}

/// Physically remove `remaining` contiguous bytes starting at
/// `(start_leaf, local_offset)`, compacting each touched leaf in place.
/// Returns the `(pgno, size-delta)` of every leaf whose `used` changed, for
/// the caller to propagate up the ancestor chain.
fn delete_bytes_physically(pager: &Pager, txn: Transaction, start_leaf: Pgno, local_offset: u64, mut remaining: u64) -> SmallResult<Vec<(Pgno, i64)>> {
    let mut out = Vec::new();
    let mut pgno = start_leaf;
    let mut local_offset = local_offset;
    loop {
        let (used, next) = match &*pager.get(pgno, PageType::DataList.bit())?.read().unwrap() {
            Page::DataList(d) => (d.used as u64, d.next),
            _ => unreachable!(),
        };
        let avail = used - local_offset;
        let take = avail.min(remaining);
        pager.write_page(txn, pgno, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                let lo = local_offset as usize;
                let t = take as usize;
                let u = d.used as usize;
                d.payload.copy_within(lo + t..u, lo);
                d.used -= t as u16;
            }
            Ok(())
        })?;
        out.push((pgno, -(take as i64)));
        remaining -= take;
        if remaining == 0 {
            break;
        }
        pgno = next;
        local_offset = 0;
        if pgno == PGNO_NULL {
            return Err(SmallError::corrupt("ran off end of leaf chain during remove"));
        }
    }
    Ok(out)
}

/// Find `target_leaf` somewhere under `node_pgno` and adjust every
/// ancestor entry's `key` on the path to it by `delta`, returning the new
/// total size of `node_pgno` if found, `None` if `target_leaf` is not in
/// this subtree.
fn propagate_delta(pager: &Pager, txn: Transaction, node_pgno: Pgno, target_leaf: Pgno, delta: i64) -> SmallResult<Option<u64>> {
    let mut entries = match &*pager.get(node_pgno, PageType::Inner.bit())?.read().unwrap() {
        Page::Inner(p) => p.entries.clone(),
        _ => unreachable!(),
    };
    let mut changed = false;
    for e in entries.iter_mut() {
        if e.leaf == target_leaf {
            e.key = (e.key as i64 + delta) as u64;
            changed = true;
            break;
        }
        if node::is_inner(pager, e.leaf)? {
            if let Some(new_size) = propagate_delta(pager, txn, e.leaf, target_leaf, delta)? {
                e.key = new_size;
                changed = true;
                break;
            }
        }
    }
    if !changed {
        return Ok(None);
    }
    let total: u64 = entries.iter().map(|e| e.key).sum();
    pager.write_page(txn, node_pgno, PageType::Inner.bit(), |p| {
        if let Page::Inner(ip) = p {
            ip.entries = entries.clone();
        }
        Ok(())
    })?;
    Ok(Some(total))
}

// -- merge-on-underflow rebalance (spec.md §4.7.2) -----------------------

/// Find the direct parent of `child` somewhere under `node_pgno`, or `None`
/// if `node_pgno` is itself a leaf or `child` is not in this subtree.
fn find_parent(pager: &Pager, node_pgno: Pgno, child: Pgno) -> SmallResult<Option<Pgno>> {
    if !node::is_inner(pager, node_pgno)? {
        return Ok(None);
    }
    let entries = match &*pager.get(node_pgno, PageType::Inner.bit())?.read().unwrap() {
        Page::Inner(p) => p.entries.clone(),
        _ => unreachable!(),
    };
    if entries.iter().any(|e| e.leaf == child) {
        return Ok(Some(node_pgno));
    }
    for e in &entries {
        if node::is_inner(pager, e.leaf)? {
            if let Some(found) = find_parent(pager, e.leaf, child)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// After a leaf shrinks, restore the half-full invariant if it now
/// violates it: merge with a sibling reached via the leaf's own
/// `prev`/`next` pointers if the combined content fits one page, otherwise
/// shift bytes across the boundary until both sides are half full again.
/// Returns the (possibly new, on root collapse) tree top.
fn rebalance_leaf(pager: &Pager, txn: Transaction, top: Pgno, leaf_pgno: Pgno) -> SmallResult<Pgno> {
    if leaf_pgno == top {
        // Sole page in the tree: no sibling to rebalance against.
        return Ok(top);
    }
    let (used, prev, next) = match &*pager.get(leaf_pgno, PageType::DataList.bit())?.read().unwrap() {
        Page::DataList(d) => (d.used as usize, d.prev, d.next),
        _ => unreachable!(),
    };
    if used * 2 >= CAPACITY {
        return Ok(top);
    }
    if next != PGNO_NULL {
        if merge_or_redistribute_leaves(pager, txn, top, leaf_pgno, next)? {
            return unlink_child(pager, txn, top, next);
        }
        return Ok(top);
    }
    if prev != PGNO_NULL {
        if merge_or_redistribute_leaves(pager, txn, top, prev, leaf_pgno)? {
            return unlink_child(pager, txn, top, leaf_pgno);
        }
    }
    Ok(top)
}

/// Merge `right` fully into `left` if their combined payload fits one
/// page (returning `true`, `right` tombstoned), otherwise shift bytes
/// across the boundary so both sides clear the half-full threshold
/// (returning `false`, both survive).
fn merge_or_redistribute_leaves(pager: &Pager, txn: Transaction, top: Pgno, left: Pgno, right: Pgno) -> SmallResult<bool> {
    let (used_l, mut payload_l) = match &*pager.get(left, PageType::DataList.bit())?.read().unwrap() {
        Page::DataList(d) => (d.used as usize, d.payload.clone()),
        _ => unreachable!(),
    };
    let (used_r, next_r, payload_r) = match &*pager.get(right, PageType::DataList.bit())?.read().unwrap() {
        Page::DataList(d) => (d.used as usize, d.next, d.payload.clone()),
        _ => unreachable!(),
    };

    if used_l + used_r <= CAPACITY {
        payload_l[used_l..used_l + used_r].copy_from_slice(&payload_r[..used_r]);
        pager.write_page(txn, left, PageType::DataList.bit(), |p| {
            if let Page::DataList(d) = p {
                d.payload = payload_l.clone();
                d.used = (used_l + used_r) as u16;
                d.next = next_r;
            }
            Ok(())
        })?;
        if next_r != PGNO_NULL {
            pager.write_page(txn, next_r, PageType::DataList.bit(), |p| {
                if let Page::DataList(d) = p {
                    d.prev = left;
                }
                Ok(())
            })?;
        }
        if node::is_inner(pager, top)? {
            propagate_delta(pager, txn, top, left, used_r as i64)?;
        }
        pager.delete_and_release(txn, right)?;
        return Ok(true);
    }

    let total = used_l + used_r;
    let target_l = total / 2;
    if target_l > used_l {
        let n = target_l - used_l;
        let mut new_l = payload_l.clone();
        new_l[used_l..used_l + n].copy_from_slice(&payload_r[..n]);
        let mut new_r = payload_r.clone();
        new_r.copy_within(n..used_r, 0);
        write_leaf_payload(pager, txn, left, &new_l, used_l + n)?;
        write_leaf_payload(pager, txn, right, &new_r, used_r - n)?;
        if node::is_inner(pager, top)? {
            propagate_delta(pager, txn, top, left, n as i64)?;
            propagate_delta(pager, txn, top, right, -(n as i64))?;
        }
    } else if target_l < used_l {
        let n = used_l - target_l;
        let mut new_r = payload_r.clone();
        new_r.copy_within(0..used_r, n);
        new_r[..n].copy_from_slice(&payload_l[used_l - n..used_l]);
        let new_l = payload_l.clone();
        write_leaf_payload(pager, txn, left, &new_l, used_l - n)?;
        write_leaf_payload(pager, txn, right, &new_r, used_r + n)?;
        if node::is_inner(pager, top)? {
            propagate_delta(pager, txn, top, left, -(n as i64))?;
            propagate_delta(pager, txn, top, right, n as i64)?;
        }
    }
    Ok(false)
}

fn write_leaf_payload(pager: &Pager, txn: Transaction, pgno: Pgno, payload: &[u8], used: usize) -> SmallResult<()> {
    pager.write_page(txn, pgno, PageType::DataList.bit(), |p| {
        if let Page::DataList(d) = p {
            d.payload.copy_from_slice(payload);
            d.used = used as u16;
        }
        Ok(())
    })
}

/// Remove `removed`'s entry from its parent and cascade: if the parent
/// itself now falls below half-full, merge or redistribute it against its
/// own sibling inner node, repeating one layer up for as long as a merge
/// empties a node. Handles root collapse (the top node left with one
/// entry becomes that entry's child; left with none becomes `PGNO_NULL`).
fn unlink_child(pager: &Pager, txn: Transaction, top: Pgno, mut removed: Pgno) -> SmallResult<Pgno> {
    loop {
        let parent = find_parent(pager, top, removed)?
            .ok_or_else(|| SmallError::corrupt("dangling child during rebalance"))?;
        let mut entries = match &*pager.get(parent, PageType::Inner.bit())?.read().unwrap() {
            Page::Inner(p) => p.entries.clone(),
            _ => unreachable!(),
        };
        let pos = entries
            .iter()
            .position(|e| e.leaf == removed)
            .ok_or_else(|| SmallError::corrupt("removed child missing from parent entries"))?;
        entries.remove(pos);

        if parent == top {
            return match entries.len() {
                0 => {
                    pager.delete_and_release(txn, parent)?;
                    Ok(PGNO_NULL)
                }
                1 => {
                    let child = entries[0].leaf;
                    pager.delete_and_release(txn, parent)?;
                    Ok(child)
                }
                _ => {
                    pager.write_page(txn, parent, PageType::Inner.bit(), |p| {
                        if let Page::Inner(ip) = p {
                            ip.entries = entries.clone();
                        }
                        Ok(())
                    })?;
                    Ok(top)
                }
            };
        }

        pager.write_page(txn, parent, PageType::Inner.bit(), |p| {
            if let Page::Inner(ip) = p {
                ip.entries = entries.clone();
            }
            Ok(())
        })?;
        if entries.len() * 2 >= M {
            return Ok(top);
        }

        let (prev, next) = match &*pager.get(parent, PageType::Inner.bit())?.read().unwrap() {
            Page::Inner(ip) => (ip.prev, ip.next),
            _ => unreachable!(),
        };
        if next != PGNO_NULL {
            if merge_or_redistribute_inner(pager, txn, top, parent, next)? {
                removed = next;
                continue;
            }
            return Ok(top);
        }
        if prev != PGNO_NULL {
            if merge_or_redistribute_inner(pager, txn, top, prev, parent)? {
                removed = parent;
                continue;
            }
        }
        return Ok(top);
    }
}

/// Inner-node analogue of [`merge_or_redistribute_leaves`]: merge `right`'s
/// entries into `left` if they fit one node (returning `true`, `right`
/// tombstoned), otherwise split the combined entries evenly across both
/// (returning `false`).
fn merge_or_redistribute_inner(pager: &Pager, txn: Transaction, top: Pgno, left: Pgno, right: Pgno) -> SmallResult<bool> {
    let mut entries_l = match &*pager.get(left, PageType::Inner.bit())?.read().unwrap() {
        Page::Inner(p) => p.entries.clone(),
        _ => unreachable!(),
    };
    let (entries_r, next_r) = match &*pager.get(right, PageType::Inner.bit())?.read().unwrap() {
        Page::Inner(p) => (p.entries.clone(), p.next),
        _ => unreachable!(),
    };
    let total_l_before: u64 = entries_l.iter().map(|e| e.key).sum();
    let total_r: u64 = entries_r.iter().map(|e| e.key).sum();

    if entries_l.len() + entries_r.len() <= M {
        entries_l.extend(entries_r);
        pager.write_page(txn, left, PageType::Inner.bit(), |p| {
            if let Page::Inner(ip) = p {
                ip.entries = entries_l.clone();
                ip.next = next_r;
            }
            Ok(())
        })?;
        if next_r != PGNO_NULL {
            pager.write_page(txn, next_r, PageType::Inner.bit(), |p| {
                if let Page::Inner(ip) = p {
                    ip.prev = left;
                }
                Ok(())
            })?;
        }
        if node::is_inner(pager, top)? {
            propagate_delta(pager, txn, top, left, total_r as i64)?;
        }
        pager.delete_and_release(txn, right)?;
        return Ok(true);
    }

    let mut combined = entries_l;
    combined.extend(entries_r);
    let mid = combined.len() / 2;
    let new_l: Vec<InnerEntry> = combined[..mid].to_vec();
    let new_r: Vec<InnerEntry> = combined[mid..].to_vec();
    let total_l_after: u64 = new_l.iter().map(|e| e.key).sum();
    let delta = total_l_after as i64 - total_l_before as i64;

    pager.write_page(txn, left, PageType::Inner.bit(), |p| {
        if let Page::Inner(ip) = p {
            ip.entries = new_l.clone();
        }
        Ok(())
    })?;
    pager.write_page(txn, right, PageType::Inner.bit(), |p| {
        if let Page::Inner(ip) = p {
            ip.entries = new_r.clone();
        }
        Ok(())
    })?;
    if delta != 0 && node::is_inner(pager, top)? {
        propagate_delta(pager, txn, top, left, delta)?;
        propagate_delta(pager, txn, top, right, -delta)?;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;
    use tempfile::tempdir;

    fn fresh_tree(pager: &Pager, txn: Transaction) -> Pgno {
        let frame = pager.new_page(txn, PageType::RptRoot).unwrap();
        frame.read().unwrap().pgno()
    }

    #[test]
    fn insert_then_read_small() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap();
        let txn = pager.begin_txn().unwrap();
        let root = fresh_tree(&pager, txn);
        insert(&pager, txn, root, 0, b"hello world").unwrap();
        pager.commit(txn).unwrap();

        let mut buf = [0u8; 11];
        let n = read(&pager, root, 0, 11, 11, 1, &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn insert_forces_leaf_and_inner_split() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap();
        let txn = pager.begin_txn().unwrap();
        let root = fresh_tree(&pager, txn);

        // Insert enough total bytes to force several leaf splits and, once
        // the number of leaves exceeds M, an inner-node split as well.
        let chunk = vec![7u8; CAPACITY / 4];
        for _ in 0..(M * 5) {
            insert(&pager, txn, root, u64::MAX, &chunk).unwrap_err();
            let frame = pager.get(root, PageType::RptRoot.bit()).unwrap();
            let total = match &*frame.read().unwrap() {
                Page::RptRoot(r) => r.total_size,
                _ => unreachable!(),
            };
            insert(&pager, txn, root, total, &chunk).unwrap();
        }
        pager.commit(txn).unwrap();

        let frame = pager.get(root, PageType::RptRoot.bit()).unwrap();
        let top = match &*frame.read().unwrap() {
            Page::RptRoot(r) => r.top,
            _ => unreachable!(),
        };
        let total = node::validate_tree(&pager, top, true).unwrap();
        assert_eq!(total, (chunk.len() * M * 5) as u64);
    }

    #[test]
    fn write_overwrites_without_changing_size() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap();
        let txn = pager.begin_txn().unwrap();
        let root = fresh_tree(&pager, txn);
        insert(&pager, txn, root, 0, b"0123456789").unwrap();
        write(&pager, txn, root, 2, 4, 4, 1, b"ABCD").unwrap();
        pager.commit(txn).unwrap();

        let mut buf = [0u8; 10];
        read(&pager, root, 0, 10, 10, 1, &mut buf).unwrap();
        assert_eq!(&buf, b"01ABCD6789");
    }

    #[test]
    fn remove_shrinks_total_size_and_compacts() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap();
        let txn = pager.begin_txn().unwrap();
        let root = fresh_tree(&pager, txn);
        insert(&pager, txn, root, 0, b"0123456789").unwrap();

        let mut removed = [0u8; 3];
        let n = remove(&pager, txn, root, 2, 3, 3, 1, Some(&mut removed)).unwrap();
        pager.commit(txn).unwrap();

        assert_eq!(n, 1);
        assert_eq!(&removed, b"234");
        let frame = pager.get(root, PageType::RptRoot.bit()).unwrap();
        let total = match &*frame.read().unwrap() {
            Page::RptRoot(r) => r.total_size,
            _ => unreachable!(),
        };
        assert_eq!(total, 7);
        let mut buf = [0u8; 7];
        read(&pager, root, 0, 7, 7, 1, &mut buf).unwrap();
        assert_eq!(&buf, b"0156789");
    }

    #[test]
    fn remove_heavy_sequence_preserves_half_full_invariant() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap();
        let txn = pager.begin_txn().unwrap();
        let root = fresh_tree(&pager, txn);

        // Same shape as `insert_forces_leaf_and_inner_split`: enough chunks
        // to force at least one inner-node split.
        let chunk = vec![9u8; CAPACITY / 4];
        let total_chunks = M * 5;
        for _ in 0..total_chunks {
            let frame = pager.get(root, PageType::RptRoot.bit()).unwrap();
            let total = match &*frame.read().unwrap() {
                Page::RptRoot(r) => r.total_size,
                _ => unreachable!(),
            };
            insert(&pager, txn, root, total, &chunk).unwrap();
        }

        // Remove all but a handful of chunks from the front: this forces
        // repeated leaf/inner merges, and likely a root collapse, on the
        // way back down to a small tree.
        let remove_chunks = total_chunks - 3;
        let removed = remove(&pager, txn, root, 0, chunk.len(), chunk.len(), remove_chunks, None).unwrap();
        pager.commit(txn).unwrap();
        assert_eq!(removed, remove_chunks);

        let frame = pager.get(root, PageType::RptRoot.bit()).unwrap();
        let (top, total) = match &*frame.read().unwrap() {
            Page::RptRoot(r) => (r.top, r.total_size),
            _ => unreachable!(),
        };
        assert_eq!(total, (chunk.len() * 3) as u64);
        let validated = node::validate_tree(&pager, top, true).unwrap();
        assert_eq!(validated, total);
    }

    #[test]
    fn read_past_end_short_reads() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(dir.path().join("d"), dir.path().join("w")).unwrap();
        let txn = pager.begin_txn().unwrap();
        let root = fresh_tree(&pager, txn);
        insert(&pager, txn, root, 0, b"abc").unwrap();
        pager.commit(txn).unwrap();

        let mut buf = [0u8; 3];
        let n = read(&pager, root, 0, 3, 3, 5, &mut buf).unwrap();
        assert_eq!(n, 1);
    }
}
