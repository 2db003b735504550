//! Transaction handle and the runtime transaction table (spec.md §3/§4.5).

use crate::types::{Lsn, Txid, LSN_NULL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborting,
    Ended,
}

#[derive(Debug, Clone, Copy)]
pub struct TxnEntry {
    pub state: TxnState,
    pub last_lsn: Lsn,
}

impl TxnEntry {
    pub fn new() -> Self {
        Self {
            state: TxnState::Active,
            last_lsn: LSN_NULL,
        }
    }
}

/// A caller-held handle; the authoritative state lives in the pager's
/// transaction table (spec.md §3: "Transactions are owned by the caller
/// but registered with the Pager").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    pub tid: Txid,
}

impl Transaction {
    pub fn new(tid: Txid) -> Self {
        Self { tid }
    }
}
