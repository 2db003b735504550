//! `VAR_HEAD` / `VAR_TAIL` pages: a variable's directory record (spec.md
//! §3, §4.9). The head page carries name length, serialised type length,
//! the RPT_ROOT page of the variable's tree, the bucket chain link, and as
//! much of `name ++ type` as fits inline; the rest overflows into a chain
//! of `VAR_TAIL` pages.

use crate::io::Decodeable;
use crate::page::header::{PageHeader, PageType, HEADER_LEN};
use crate::page::PAGE_SIZE;
use crate::types::{Pgno, SmallResult, LSN_NULL, PGNO_NULL};

/// Bound on a variable name's length (spec.md §4.9).
pub const MAX_VSTR: usize = 4096;

const VAR_HEAD_FIXED_LEN: usize = 2 + 2 + 2 + 8 + 8 + 8; // name_len|type_len|used|root|bucket_next|tail
pub const VAR_HEAD_INLINE_CAP: usize = PAGE_SIZE - HEADER_LEN - VAR_HEAD_FIXED_LEN;

const VAR_TAIL_FIXED_LEN: usize = 2 + 8; // used|next
pub const VAR_TAIL_INLINE_CAP: usize = PAGE_SIZE - HEADER_LEN - VAR_TAIL_FIXED_LEN;

#[derive(Debug, Clone)]
pub struct VarHeadPage {
    pub header: PageHeader,
    pub name_len: u16,
    pub type_len: u16,
    pub root: Pgno,
    pub bucket_next: Pgno,
    pub tail: Pgno,
    /// Number of valid bytes at the front of `inline` (mirrors
    /// `DataListPage.used`); `Page::encode` zero-pads every page body out to
    /// `PAGE_SIZE`, so without this `decode` would otherwise pick up that
    /// padding as if it were part of `name ++ type`.
    pub used: u16,
    /// First `used` bytes of `name ++ type`, up to `VAR_HEAD_INLINE_CAP`.
    pub inline: Vec<u8>,
}

impl VarHeadPage {
    pub fn new_empty(pgno: Pgno) -> Self {
        Self {
            header: PageHeader {
                pgno,
                page_type: PageType::VarHead,
                lsn: LSN_NULL,
            },
            name_len: 0,
            type_len: 0,
            root: PGNO_NULL,
            bucket_next: PGNO_NULL,
            tail: PGNO_NULL,
            used: 0,
            inline: Vec::new(),
        }
    }

    pub fn total_len(&self) -> usize {
        self.name_len as usize + self.type_len as usize
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.name_len.to_le_bytes());
        out.extend_from_slice(&self.type_len.to_le_bytes());
        out.extend_from_slice(&self.used.to_le_bytes());
        out.extend_from_slice(&self.root.to_le_bytes());
        out.extend_from_slice(&self.bucket_next.to_le_bytes());
        out.extend_from_slice(&self.tail.to_le_bytes());
        out.extend_from_slice(&self.inline);
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let name_len = u16::decode_from(&mut cur)?;
        let type_len = u16::decode_from(&mut cur)?;
        let used = u16::decode_from(&mut cur)?;
        let root = Pgno::decode_from(&mut cur)?;
        let bucket_next = Pgno::decode_from(&mut cur)?;
        let tail = Pgno::decode_from(&mut cur)?;
        let inline = body[VAR_HEAD_FIXED_LEN..VAR_HEAD_FIXED_LEN + used as usize].to_vec();
        Ok(Self {
            header,
            name_len,
            type_len,
            root,
            bucket_next,
            tail,
            used,
            inline,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VarTailPage {
    pub header: PageHeader,
    pub next: Pgno,
    /// Number of valid bytes at the front of `inline` (mirrors
    /// `DataListPage.used`); see `VarHeadPage::used`.
    pub used: u16,
    pub inline: Vec<u8>,
}

impl VarTailPage {
    pub fn new_empty(pgno: Pgno) -> Self {
        Self {
            header: PageHeader {
                pgno,
                page_type: PageType::VarTail,
                lsn: LSN_NULL,
            },
            next: PGNO_NULL,
            used: 0,
            inline: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.next.to_le_bytes());
        out.extend_from_slice(&self.used.to_le_bytes());
        out.extend_from_slice(&self.inline);
        out
    }

    pub fn decode(header: PageHeader, body: &[u8]) -> SmallResult<Self> {
        let mut cur = std::io::Cursor::new(body);
        let next = Pgno::decode_from(&mut cur)?;
        let used = u16::decode_from(&mut cur)?;
        let inline = body[VAR_TAIL_FIXED_LEN..VAR_TAIL_FIXED_LEN + used as usize].to_vec();
        Ok(Self {
            header,
            next,
            used,
            inline,
        })
    }
}
