//! `TOMBSTONE` page: a deallocated page linked into `ROOT.first_tmbst`'s
//! free chain (spec.md §3).

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType};
use crate::types::{Pgno, SmallResult, LSN_NULL, PGNO_NULL};

#[derive(Debug, Clone)]
pub struct TombstonePage {
    pub header: PageHeader,
    pub next: Pgno,
}

impl TombstonePage {
    pub fn new(pgno: Pgno, next: Pgno) -> Self {
        Self {
            header: PageHeader {
                pgno,
                page_type: PageType::Tombstone,
                lsn: LSN_NULL,
            },
            next,
        }
    }

    pub fn new_empty(pgno: Pgno) -> Self {
        Self::new(pgno, PGNO_NULL)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.next.to_le_bytes());
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let next = Pgno::decode_from(&mut cur)?;
        Ok(Self { header, next })
    }
}
