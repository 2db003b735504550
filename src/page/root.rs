//! `ROOT` page: always page 0 (spec.md §3/§6).

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType};
use crate::types::{Lsn, Pgno, SmallResult, LSN_NULL, PGNO_NULL};

pub const ROOT_PGNO: Pgno = 0;

#[derive(Debug, Clone)]
pub struct RootPage {
    pub header: PageHeader,
    /// Head of the tombstone (free-page) chain, or `PGNO_NULL`.
    pub first_tmbst: Pgno,
    /// LSN of the last checkpoint's `CKPT_BEGIN`, or 0.
    pub master_lsn: Lsn,
}

impl RootPage {
    pub fn new_empty() -> Self {
        Self {
            header: PageHeader {
                pgno: ROOT_PGNO,
                page_type: PageType::Root,
                lsn: LSN_NULL,
            },
            first_tmbst: PGNO_NULL,
            master_lsn: LSN_NULL,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.first_tmbst.to_le_bytes());
        out.extend_from_slice(&self.master_lsn.to_le_bytes());
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let first_tmbst = Pgno::decode_from(&mut cur)?;
        let master_lsn = Lsn::decode_from(&mut cur)?;
        Ok(Self {
            header,
            first_tmbst,
            master_lsn,
        })
    }
}
