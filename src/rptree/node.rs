//! B+ tree node primitives (spec.md §3/§4.7 component 9): type dispatch
//! between the inner-node and data-list layers, and the invariant checker
//! used by the integration tests for testable property 8.

use crate::error::SmallError;
use crate::page::{Page, PageType};
use crate::pager::Pager;
use crate::types::{Pgno, SmallResult};

/// True if `pgno` is an `INNER` page, false if it is a `DATA_LIST` leaf.
pub fn is_inner(pager: &Pager, pgno: Pgno) -> SmallResult<bool> {
    let frame = pager.get(pgno, PageType::Inner.bit() | PageType::DataList.bit())?;
    Ok(matches!(&*frame.read().unwrap(), Page::Inner(_)))
}

/// Recursively check the invariants from spec.md §8 testable property 8
/// (`key[i]` matches subtree size, no duplicate `leaf`, half-full non-root
/// nodes) and return the subtree's total byte size.
pub fn validate_tree(pager: &Pager, pgno: Pgno, is_root: bool) -> SmallResult<u64> {
    let frame = pager.get(pgno, PageType::Inner.bit() | PageType::DataList.bit())?;
    let snapshot = frame.read().unwrap().clone();
    match snapshot {
        Page::DataList(d) => Ok(d.used as u64),
        Page::Inner(ip) => {
            ip.validate()?;
            if !is_root && !ip.is_half_full() {
                return Err(SmallError::corrupt("inner node below half-full invariant"));
            }
            let mut seen_leaves = std::collections::HashSet::new();
            let mut total = 0u64;
            for e in &ip.entries {
                if !seen_leaves.insert(e.leaf) {
                    return Err(SmallError::corrupt("duplicate leaf across validation"));
                }
                let child_total = validate_tree(pager, e.leaf, false)?;
                if child_total != e.key {
                    return Err(SmallError::corrupt("inner key does not match subtree size"));
                }
                total += child_total;
            }
            Ok(total)
        }
        _ => Err(SmallError::corrupt("unexpected page type in rptree")),
    }
}
