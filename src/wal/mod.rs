//! Write-ahead log: typed records (spec.md §3/§6) and the append-only file
//! that stores them (spec.md §4/§5 component 6).

pub mod file;
pub mod record;

pub use file::WalFile;
pub use record::{Record, TxState};
