//! `DATA_LIST` page: a leaf of the data-list layer (spec.md §3) holding
//! raw variable-payload bytes, doubly linked to its siblings.

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType, HEADER_LEN};
use crate::page::PAGE_SIZE;
use crate::types::{Pgno, SmallResult, LSN_NULL, PGNO_NULL};

const FIXED_LEN: usize = 8 + 8 + 2; // prev | next | used

/// Fixed payload capacity of a leaf.
pub const CAPACITY: usize = PAGE_SIZE - HEADER_LEN - FIXED_LEN;

#[derive(Debug, Clone)]
pub struct DataListPage {
    pub header: PageHeader,
    pub prev: Pgno,
    pub next: Pgno,
    pub used: u16,
    pub payload: Vec<u8>,
}

impl DataListPage {
    pub fn new_empty(pgno: Pgno) -> Self {
        Self {
            header: PageHeader {
                pgno,
                page_type: PageType::DataList,
                lsn: LSN_NULL,
            },
            prev: PGNO_NULL,
            next: PGNO_NULL,
            used: 0,
            payload: vec![0u8; CAPACITY],
        }
    }

    pub fn free_space(&self) -> usize {
        CAPACITY - self.used as usize
    }

    pub fn is_half_full(&self) -> bool {
        (self.used as usize) * 2 >= CAPACITY
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.prev.to_le_bytes());
        out.extend_from_slice(&self.next.to_le_bytes());
        out.extend_from_slice(&self.used.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let prev = Pgno::decode_from(&mut cur)?;
        let next = Pgno::decode_from(&mut cur)?;
        let used = u16::decode_from(&mut cur)?;
        let payload = body[FIXED_LEN..FIXED_LEN + CAPACITY].to_vec();
        Ok(Self {
            header,
            prev,
            next,
            used,
            payload,
        })
    }
}
