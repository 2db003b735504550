//! `RPT_ROOT` page: the root of one variable's B+ tree (spec.md §3). Tracks
//! the current top-layer page and the tree's total byte size.

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType};
use crate::types::{Pgno, SmallResult, LSN_NULL, PGNO_NULL};

#[derive(Debug, Clone)]
pub struct RptRootPage {
    pub header: PageHeader,
    /// `PGNO_NULL` means the tree is empty (no top layer yet).
    pub top: Pgno,
    pub total_size: u64,
}

impl RptRootPage {
    pub fn new_empty(pgno: Pgno) -> Self {
        Self {
            header: PageHeader {
                pgno,
                page_type: PageType::RptRoot,
                lsn: LSN_NULL,
            },
            top: PGNO_NULL,
            total_size: 0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.top.to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let top = Pgno::decode_from(&mut cur)?;
        let total_size = u64::decode_from(&mut cur)?;
        Ok(Self {
            header,
            top,
            total_size,
        })
    }
}
