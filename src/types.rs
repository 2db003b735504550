//! Core scalar type aliases shared across the storage engine.
//!
//! All on-disk integers are little-endian (spec.md §6): `Pgno` and `Lsn` are
//! 64-bit, `Txid` is 64-bit, and in-page sizes (`BSize`) are 16-bit.

use crate::error::SmallError;

/// Page number. `PGNO_NULL` (all-ones) means "no page".
pub type Pgno = u64;

/// Log sequence number: a monotonically increasing WAL byte offset.
pub type Lsn = u64;

/// Transaction id.
pub type Txid = u64;

/// In-page byte size/offset.
pub type BSize = u16;

pub const PGNO_NULL: Pgno = u64::MAX;
pub const LSN_NULL: Lsn = 0;

/// Result alias used throughout the crate, matching the teacher's
/// `SmallResult` naming.
pub type SmallResult<T = ()> = Result<T, SmallError>;
