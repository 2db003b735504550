//! `INNER` page: one layer of a B+ tree's interior (spec.md §3/§4.7/§4.9
//! component 9). Entries are ordered by position in the leaf chain, not by
//! key value; `key` is the cumulative byte size of the subtree rooted at
//! `leaf`.

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType, HEADER_LEN};
use crate::page::PAGE_SIZE;
use crate::types::{Pgno, SmallResult, LSN_NULL, PGNO_NULL};

const FIXED_LEN: usize = 8 + 8 + 2; // prev | next | nentries
const ENTRY_LEN: usize = 8 + 8; // key:u64 | leaf:pgno

/// Maximum entries an inner node can hold. Non-root nodes must carry at
/// least `M/2` (spec.md §3 invariants).
pub const M: usize = (PAGE_SIZE - HEADER_LEN - FIXED_LEN) / ENTRY_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerEntry {
    pub key: u64,
    pub leaf: Pgno,
}

#[derive(Debug, Clone)]
pub struct InnerPage {
    pub header: PageHeader,
    pub prev: Pgno,
    pub next: Pgno,
    pub entries: Vec<InnerEntry>,
}

impl InnerPage {
    pub fn new_empty(pgno: Pgno) -> Self {
        Self {
            header: PageHeader {
                pgno,
                page_type: PageType::Inner,
                lsn: LSN_NULL,
            },
            prev: PGNO_NULL,
            next: PGNO_NULL,
            entries: Vec::new(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.key).sum()
    }

    /// True for a non-root node satisfying the half-full invariant.
    pub fn is_half_full(&self) -> bool {
        self.entries.len() * 2 >= M
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= M
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.prev.to_le_bytes());
        out.extend_from_slice(&self.next.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for e in &self.entries {
            out.extend_from_slice(&e.key.to_le_bytes());
            out.extend_from_slice(&e.leaf.to_le_bytes());
        }
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let prev = Pgno::decode_from(&mut cur)?;
        let next = Pgno::decode_from(&mut cur)?;
        let nentries = u16::decode_from(&mut cur)? as usize;
        let mut entries = Vec::with_capacity(nentries);
        for _ in 0..nentries {
            let key = u64::decode_from(&mut cur)?;
            let leaf = Pgno::decode_from(&mut cur)?;
            entries.push(InnerEntry { key, leaf });
        }
        Ok(Self {
            header,
            prev,
            next,
            entries,
        })
    }

    /// Validate the intra-page invariants (spec.md §3): no duplicate
    /// `leaf` values, node within capacity.
    pub fn validate(&self) -> SmallResult {
        if self.entries.len() > M {
            return Err(crate::error::SmallError::corrupt("inner node overflow"));
        }
        let mut seen = std::collections::HashSet::new();
        for e in &self.entries {
            if !seen.insert(e.leaf) {
                return Err(crate::error::SmallError::corrupt(
                    "duplicate leaf in inner node",
                ));
            }
        }
        Ok(())
    }
}
