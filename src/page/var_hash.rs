//! `VAR_HASH` page: always page 1. A fixed-length array of bucket heads
//! that the variable directory cursor (spec.md §4.9) hashes a name into.

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType};
use crate::types::{Pgno, SmallResult, LSN_NULL, PGNO_NULL};

pub const VAR_HASH_PGNO: Pgno = 1;
pub const NUM_BUCKETS: usize = 509;

#[derive(Debug, Clone)]
pub struct VarHashPage {
    pub header: PageHeader,
    pub buckets: Vec<Pgno>,
}

impl VarHashPage {
    pub fn new_empty() -> Self {
        Self {
            header: PageHeader {
                pgno: VAR_HASH_PGNO,
                page_type: PageType::VarHash,
                lsn: LSN_NULL,
            },
            buckets: vec![PGNO_NULL; NUM_BUCKETS],
        }
    }

    pub fn bucket_for(&self, name: &[u8]) -> usize {
        let mut h: u64 = 1469598103934665603; // FNV-1a offset basis
        for b in name {
            h ^= *b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        (h % NUM_BUCKETS as u64) as usize
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        for b in &self.buckets {
            out.extend_from_slice(&b.to_le_bytes());
        }
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let mut buckets = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            buckets.push(Pgno::decode_from(&mut cur)?);
        }
        Ok(Self { header, buckets })
    }
}
