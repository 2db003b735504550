//! WAL record variants and their wire format (spec.md §3, §6 component 6).
//!
//! Every record is `type:u8 | <payload> | crc32:u32`, CRC computed over
//! `type` through the end of the payload. `undo_image`/`redo_image` are
//! full `PAGE_SIZE` page images (physiological logging is not required).

use crate::error::SmallError;
use crate::page::PAGE_SIZE;
use crate::types::{Lsn, Pgno, SmallResult, Txid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
}

impl TxState {
    fn to_u8(self) -> u8 {
        match self {
            TxState::Active => 0,
            TxState::Committed => 1,
        }
    }

    fn from_u8(v: u8) -> SmallResult<Self> {
        match v {
            0 => Ok(TxState::Active),
            1 => Ok(TxState::Committed),
            _ => Err(SmallError::corrupt("bad tx state tag")),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Record {
    Begin {
        tid: Txid,
    },
    Update {
        tid: Txid,
        prev_lsn: Lsn,
        pgno: Pgno,
        undo_image: Vec<u8>,
        redo_image: Vec<u8>,
    },
    Clr {
        tid: Txid,
        prev_lsn: Lsn,
        pgno: Pgno,
        undo_next_lsn: Lsn,
        redo_image: Vec<u8>,
    },
    Commit {
        tid: Txid,
        prev_lsn: Lsn,
    },
    End {
        tid: Txid,
        prev_lsn: Lsn,
    },
    CkptBegin,
    CkptEnd {
        att: Vec<(Txid, TxState, Lsn)>,
        dpt: Vec<(Pgno, Lsn)>,
    },
}

const T_BEGIN: u8 = 0;
const T_UPDATE: u8 = 1;
const T_CLR: u8 = 2;
const T_COMMIT: u8 = 3;
const T_END: u8 = 4;
const T_CKPT_BEGIN: u8 = 5;
const T_CKPT_END: u8 = 6;

impl Record {
    pub fn tid(&self) -> Option<Txid> {
        match self {
            Record::Begin { tid }
            | Record::Update { tid, .. }
            | Record::Clr { tid, .. }
            | Record::Commit { tid, .. }
            | Record::End { tid, .. } => Some(*tid),
            Record::CkptBegin | Record::CkptEnd { .. } => None,
        }
    }

    /// `(type byte | payload)`, without the trailing CRC; `crc32c` is
    /// computed over exactly these bytes.
    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Record::Begin { tid } => {
                out.push(T_BEGIN);
                out.extend_from_slice(&tid.to_le_bytes());
            }
            Record::Update {
                tid,
                prev_lsn,
                pgno,
                undo_image,
                redo_image,
            } => {
                out.push(T_UPDATE);
                out.extend_from_slice(&tid.to_le_bytes());
                out.extend_from_slice(&prev_lsn.to_le_bytes());
                out.extend_from_slice(&pgno.to_le_bytes());
                debug_assert_eq!(undo_image.len(), PAGE_SIZE);
                debug_assert_eq!(redo_image.len(), PAGE_SIZE);
                out.extend_from_slice(undo_image);
                out.extend_from_slice(redo_image);
            }
            Record::Clr {
                tid,
                prev_lsn,
                pgno,
                undo_next_lsn,
                redo_image,
            } => {
                out.push(T_CLR);
                out.extend_from_slice(&tid.to_le_bytes());
                out.extend_from_slice(&prev_lsn.to_le_bytes());
                out.extend_from_slice(&pgno.to_le_bytes());
                out.extend_from_slice(&undo_next_lsn.to_le_bytes());
                debug_assert_eq!(redo_image.len(), PAGE_SIZE);
                out.extend_from_slice(redo_image);
            }
            Record::Commit { tid, prev_lsn } => {
                out.push(T_COMMIT);
                out.extend_from_slice(&tid.to_le_bytes());
                out.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            Record::End { tid, prev_lsn } => {
                out.push(T_END);
                out.extend_from_slice(&tid.to_le_bytes());
                out.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            Record::CkptBegin => {
                out.push(T_CKPT_BEGIN);
            }
            Record::CkptEnd { att, dpt } => {
                out.push(T_CKPT_END);
                out.extend_from_slice(&(att.len() as u32).to_le_bytes());
                out.extend_from_slice(&(dpt.len() as u32).to_le_bytes());
                for (tid, state, lsn) in att {
                    out.extend_from_slice(&tid.to_le_bytes());
                    out.push(state.to_u8());
                    out.extend_from_slice(&lsn.to_le_bytes());
                }
                for (pgno, lsn) in dpt {
                    out.extend_from_slice(&pgno.to_le_bytes());
                    out.extend_from_slice(&lsn.to_le_bytes());
                }
            }
        }
        out
    }

    /// Full on-disk encoding including the trailing CRC32.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.encode_body();
        let crc = crc32c::crc32c(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode one record from `bytes` (which must contain at least one
    /// full record, possibly more after it). Returns the record and the
    /// number of bytes consumed. A short buffer or CRC mismatch is treated
    /// as EOF (spec.md §7): returns `Ok(None)`, never an error, so the
    /// scanner can stop cleanly at a torn tail.
    pub fn decode(bytes: &[u8]) -> SmallResult<Option<(Record, usize)>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let ty = bytes[0];
        let body_len = match ty {
            T_BEGIN => 1 + 8,
            T_UPDATE => 1 + 8 + 8 + 8 + PAGE_SIZE + PAGE_SIZE,
            T_CLR => 1 + 8 + 8 + 8 + 8 + PAGE_SIZE,
            T_COMMIT | T_END => 1 + 8 + 8,
            T_CKPT_BEGIN => 1,
            T_CKPT_END => {
                if bytes.len() < 1 + 4 + 4 {
                    return Ok(None);
                }
                let att_n = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
                let dpt_n = u32::from_le_bytes(bytes[5..9].try_into().unwrap()) as usize;
                1 + 4 + 4 + att_n * (8 + 1 + 8) + dpt_n * (8 + 8)
            }
            _ => return Ok(None),
        };
        let total = body_len + 4;
        if bytes.len() < total {
            return Ok(None);
        }
        let body = &bytes[..body_len];
        let stored_crc = u32::from_le_bytes(bytes[body_len..total].try_into().unwrap());
        if crc32c::crc32c(body) != stored_crc {
            return Ok(None);
        }

        let record = Self::decode_body(ty, &body[1..])?;
        Ok(Some((record, total)))
    }

    fn decode_body(ty: u8, p: &[u8]) -> SmallResult<Record> {
        let u64_at = |o: usize| -> u64 { u64::from_le_bytes(p[o..o + 8].try_into().unwrap()) };
        Ok(match ty {
            T_BEGIN => Record::Begin { tid: u64_at(0) },
            T_UPDATE => {
                let tid = u64_at(0);
                let prev_lsn = u64_at(8);
                let pgno = u64_at(16);
                let undo_image = p[24..24 + PAGE_SIZE].to_vec();
                let redo_image = p[24 + PAGE_SIZE..24 + 2 * PAGE_SIZE].to_vec();
                Record::Update {
                    tid,
                    prev_lsn,
                    pgno,
                    undo_image,
                    redo_image,
                }
            }
            T_CLR => {
                let tid = u64_at(0);
                let prev_lsn = u64_at(8);
                let pgno = u64_at(16);
                let undo_next_lsn = u64_at(24);
                let redo_image = p[32..32 + PAGE_SIZE].to_vec();
                Record::Clr {
                    tid,
                    prev_lsn,
                    pgno,
                    undo_next_lsn,
                    redo_image,
                }
            }
            T_COMMIT => Record::Commit {
                tid: u64_at(0),
                prev_lsn: u64_at(8),
            },
            T_END => Record::End {
                tid: u64_at(0),
                prev_lsn: u64_at(8),
            },
            T_CKPT_BEGIN => Record::CkptBegin,
            T_CKPT_END => {
                let att_n = u32::from_le_bytes(p[0..4].try_into().unwrap()) as usize;
                let dpt_n = u32::from_le_bytes(p[4..8].try_into().unwrap()) as usize;
                let mut off = 8;
                let mut att = Vec::with_capacity(att_n);
                for _ in 0..att_n {
                    let tid = u64::from_le_bytes(p[off..off + 8].try_into().unwrap());
                    let state = TxState::from_u8(p[off + 8])?;
                    let lsn = u64::from_le_bytes(p[off + 9..off + 17].try_into().unwrap());
                    att.push((tid, state, lsn));
                    off += 17;
                }
                let mut dpt = Vec::with_capacity(dpt_n);
                for _ in 0..dpt_n {
                    let pgno = u64::from_le_bytes(p[off..off + 8].try_into().unwrap());
                    let lsn = u64::from_le_bytes(p[off + 8..off + 16].try_into().unwrap());
                    dpt.push((pgno, lsn));
                    off += 16;
                }
                Record::CkptEnd { att, dpt }
            }
            _ => unreachable!("validated by caller"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_round_trip() {
        let r = Record::Begin { tid: 7 };
        let bytes = r.encode();
        let (decoded, used) = Record::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        match decoded {
            Record::Begin { tid } => assert_eq!(tid, 7),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn update_round_trip() {
        let r = Record::Update {
            tid: 1,
            prev_lsn: 0,
            pgno: 3,
            undo_image: vec![1u8; PAGE_SIZE],
            redo_image: vec![2u8; PAGE_SIZE],
        };
        let bytes = r.encode();
        let (decoded, used) = Record::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        if let Record::Update {
            undo_image,
            redo_image,
            ..
        } = decoded
        {
            assert_eq!(undo_image, vec![1u8; PAGE_SIZE]);
            assert_eq!(redo_image, vec![2u8; PAGE_SIZE]);
        } else {
            panic!("wrong variant");
        }
    }

    #[test]
    fn ckpt_end_round_trip() {
        let r = Record::CkptEnd {
            att: vec![(1, TxState::Active, 10), (2, TxState::Committed, 20)],
            dpt: vec![(5, 3), (6, 4)],
        };
        let bytes = r.encode();
        let (decoded, used) = Record::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        if let Record::CkptEnd { att, dpt } = decoded {
            assert_eq!(att.len(), 2);
            assert_eq!(dpt.len(), 2);
        } else {
            panic!("wrong variant");
        }
    }

    #[test]
    fn truncated_tail_is_not_an_error() {
        let r = Record::Begin { tid: 7 };
        let mut bytes = r.encode();
        bytes.truncate(bytes.len() - 2);
        assert!(Record::decode(&bytes).unwrap().is_none());
    }

    #[test]
    fn bad_crc_is_not_an_error() {
        let r = Record::Begin { tid: 7 };
        let mut bytes = r.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(Record::decode(&bytes).unwrap().is_none());
    }
}
