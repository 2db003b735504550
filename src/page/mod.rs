//! Fixed-size page codec (spec.md §3, §4, §6 component 1).

pub mod data_list;
pub mod header;
pub mod inner;
pub mod rpt_root;
pub mod root;
pub mod tombstone;
pub mod var_hash;
pub mod var_record;

pub use data_list::DataListPage;
pub use header::{PageHeader, PageType};
pub use inner::InnerPage;
pub use rpt_root::RptRootPage;
pub use root::RootPage;
pub use tombstone::TombstonePage;
pub use var_hash::VarHashPage;
pub use var_record::{VarHeadPage, VarTailPage};

use crate::error::SmallError;
use crate::io::Decodeable;
use crate::types::{Lsn, Pgno, SmallResult};

/// Compile-time fixed page size.
pub const PAGE_SIZE: usize = 4096;

/// Every concrete page body, dispatched on the header's type tag.
#[derive(Debug, Clone)]
pub enum Page {
    Root(RootPage),
    VarHash(VarHashPage),
    VarHead(VarHeadPage),
    VarTail(VarTailPage),
    Inner(InnerPage),
    DataList(DataListPage),
    Tombstone(TombstonePage),
    RptRoot(RptRootPage),
}

impl Page {
    pub fn pgno(&self) -> Pgno {
        self.header().pgno
    }

    pub fn page_type(&self) -> PageType {
        self.header().page_type
    }

    pub fn lsn(&self) -> Lsn {
        self.header().lsn
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        match self {
            Page::Root(p) => p.header.lsn = lsn,
            Page::VarHash(p) => p.header.lsn = lsn,
            Page::VarHead(p) => p.header.lsn = lsn,
            Page::VarTail(p) => p.header.lsn = lsn,
            Page::Inner(p) => p.header.lsn = lsn,
            Page::DataList(p) => p.header.lsn = lsn,
            Page::Tombstone(p) => p.header.lsn = lsn,
            Page::RptRoot(p) => p.header.lsn = lsn,
        }
    }

    pub fn header(&self) -> &PageHeader {
        match self {
            Page::Root(p) => &p.header,
            Page::VarHash(p) => &p.header,
            Page::VarHead(p) => &p.header,
            Page::VarTail(p) => &p.header,
            Page::Inner(p) => &p.header,
            Page::DataList(p) => &p.header,
            Page::Tombstone(p) => &p.header,
            Page::RptRoot(p) => &p.header,
        }
    }

    /// Encode to a full, zero-padded `PAGE_SIZE`-byte image.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = match self {
            Page::Root(p) => p.encode(),
            Page::VarHash(p) => p.encode(),
            Page::VarHead(p) => p.encode(),
            Page::VarTail(p) => p.encode(),
            Page::Inner(p) => p.encode(),
            Page::DataList(p) => p.encode(),
            Page::Tombstone(p) => p.encode(),
            Page::RptRoot(p) => p.encode(),
        };
        debug_assert!(bytes.len() <= PAGE_SIZE, "page body overflowed PAGE_SIZE");
        bytes.resize(PAGE_SIZE, 0);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> SmallResult<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(SmallError::corrupt("page image has the wrong length"));
        }
        let mut cur = std::io::Cursor::new(bytes);
        let header = PageHeader::decode_from(&mut cur)?;
        let body = &bytes[header::HEADER_LEN..];
        Ok(match header.page_type {
            PageType::Root => Page::Root(RootPage::decode(header, body)?),
            PageType::VarHash => Page::VarHash(VarHashPage::decode(header, body)?),
            PageType::VarHead => Page::VarHead(VarHeadPage::decode(header, body)?),
            PageType::VarTail => Page::VarTail(VarTailPage::decode(header, body)?),
            PageType::Inner => Page::Inner(InnerPage::decode(header, body)?),
            PageType::DataList => Page::DataList(DataListPage::decode(header, body)?),
            PageType::Tombstone => Page::Tombstone(TombstonePage::decode(header, body)?),
            PageType::RptRoot => Page::RptRoot(RptRootPage::decode(header, body)?),
        })
    }

    /// Validate this page's type is one of `expected_types` (a bitmask of
    /// `PageType::bit()`); used by the pager's `get`/`get_writable`.
    pub fn check_type(&self, expected_types: u32) -> SmallResult {
        if self.page_type().bit() & expected_types == 0 {
            return Err(SmallError::corrupt(&format!(
                "page {} has unexpected type {:?}",
                self.pgno(),
                self.page_type()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::inner::InnerEntry;

    #[test]
    fn root_page_round_trip() {
        let mut p = RootPage::new_empty();
        p.first_tmbst = 42;
        p.master_lsn = 7;
        let page = Page::Root(p);
        let bytes = page.encode();
        let decoded = Page::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn var_hash_page_round_trip() {
        let mut p = VarHashPage::new_empty();
        p.buckets[3] = 99;
        let page = Page::VarHash(p);
        let bytes = page.encode();
        let decoded = Page::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn inner_page_round_trip() {
        let mut p = InnerPage::new_empty(5);
        p.prev = 4;
        p.next = 6;
        p.entries.push(InnerEntry { key: 10, leaf: 100 });
        p.entries.push(InnerEntry { key: 20, leaf: 101 });
        let page = Page::Inner(p);
        let bytes = page.encode();
        let decoded = Page::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn data_list_page_round_trip() {
        let mut p = DataListPage::new_empty(9);
        p.used = 3;
        p.payload[0] = 1;
        p.payload[1] = 2;
        p.payload[2] = 3;
        let page = Page::DataList(p);
        let bytes = page.encode();
        let decoded = Page::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn tombstone_round_trip() {
        let p = TombstonePage::new(12, 13);
        let page = Page::Tombstone(p);
        let bytes = page.encode();
        let decoded = Page::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn type_check_rejects_mismatch() {
        let page = Page::Root(RootPage::new_empty());
        assert!(page.check_type(PageType::Root.bit()).is_ok());
        assert!(page.check_type(PageType::Inner.bit()).is_err());
    }
}
