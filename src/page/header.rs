//! Fixed page header shared by every page type (spec.md §3/§6): a page
//! number, a type tag, and a per-page LSN used by redo to decide whether
//! an update has already been applied (spec.md §4.6 redo pass).

use crate::error::SmallError;
use crate::io::{Decodeable, Encodeable};
use crate::types::{Lsn, Pgno, SmallResult};

pub const HEADER_LEN: usize = 8 + 1 + 8; // pgno | type | lsn

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Root,
    VarHash,
    VarHead,
    VarTail,
    Inner,
    DataList,
    Tombstone,
    RptRoot,
}

impl PageType {
    pub fn to_u8(self) -> u8 {
        match self {
            PageType::Root => 0,
            PageType::VarHash => 1,
            PageType::VarHead => 2,
            PageType::VarTail => 3,
            PageType::Inner => 4,
            PageType::DataList => 5,
            PageType::Tombstone => 6,
            PageType::RptRoot => 7,
        }
    }

    pub fn from_u8(v: u8) -> SmallResult<Self> {
        Ok(match v {
            0 => PageType::Root,
            1 => PageType::VarHash,
            2 => PageType::VarHead,
            3 => PageType::VarTail,
            4 => PageType::Inner,
            5 => PageType::DataList,
            6 => PageType::Tombstone,
            7 => PageType::RptRoot,
            other => {
                return Err(SmallError::corrupt(&format!(
                    "unknown page type tag {}",
                    other
                )))
            }
        })
    }

    /// Bitmask helper so `Pager::get` can validate against several
    /// acceptable types at once (e.g. a bucket head that may be either a
    /// freshly-allocated or an existing `VAR_HEAD`).
    pub fn bit(self) -> u32 {
        1 << self.to_u8()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub pgno: Pgno,
    pub page_type: PageType,
    pub lsn: Lsn,
}

impl Encodeable for PageHeader {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.pgno.to_le_bytes());
        out.push(self.page_type.to_u8());
        out.extend_from_slice(&self.lsn.to_le_bytes());
        out
    }
}

impl Decodeable for PageHeader {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> SmallResult<Self> {
        let pgno = Pgno::decode_from(reader)?;
        let mut ty = [0u8; 1];
        std::io::Read::read_exact(reader, &mut ty).map_err(SmallError::from)?;
        let page_type = PageType::from_u8(ty[0])?;
        let lsn = Lsn::decode_from(reader)?;
        Ok(PageHeader {
            pgno,
            page_type,
            lsn,
        })
    }
}
