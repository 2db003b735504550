//! Byte-level (de)serialization primitives shared by the page codec and the
//! WAL record codec.
//!
//! Grounded on the teacher's `io.rs` `SmallFile` + `Encodeable`/`Decodeable`
//! pair, generalized to the fixed little-endian wire format spec.md §6
//! requires (`pgno`/`lsn` as `u64`, `b_size` as `u16`).

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::error::SmallError;
use crate::types::SmallResult;

/// Implemented by every wire value (page bodies, WAL record payloads).
pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable: Sized {
    fn decode_from<R: Read>(reader: &mut R) -> SmallResult<Self>;
}

macro_rules! impl_int_codec {
    ($t:ty, $n:expr) => {
        impl Encodeable for $t {
            fn encode(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }
        }

        impl Decodeable for $t {
            fn decode_from<R: Read>(reader: &mut R) -> SmallResult<Self> {
                let mut buf = [0u8; $n];
                reader.read_exact(&mut buf).map_err(SmallError::from)?;
                Ok(<$t>::from_le_bytes(buf))
            }
        }
    };
}

impl_int_codec!(u16, 2);
impl_int_codec!(u32, 4);
impl_int_codec!(u64, 8);

pub fn read_exact_vec<R: Read>(reader: &mut R, n: usize) -> SmallResult<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf).map_err(SmallError::from)?;
    Ok(buf)
}

/// A file wrapped for positional, page-aligned access. Every read/write
/// seeks first, so callers never rely on an implicit cursor position
/// (the pager always addresses pages by absolute offset).
pub struct SmallFile {
    file: File,
}

impl SmallFile {
    pub fn open<P: AsRef<Path>>(path: P) -> SmallResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(SmallError::from)?;
        Ok(Self { file })
    }

    pub fn len(&self) -> SmallResult<u64> {
        Ok(self.file.metadata().map_err(SmallError::from)?.len())
    }

    pub fn set_len(&self, len: u64) -> SmallResult {
        self.file.set_len(len).map_err(SmallError::from)
    }

    pub fn read_at(&mut self, offset: u64, len: usize) -> SmallResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).map_err(SmallError::from)?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).map_err(SmallError::from)?;
        Ok(buf)
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> SmallResult {
        self.file.seek(SeekFrom::Start(offset)).map_err(SmallError::from)?;
        self.file.write_all(bytes).map_err(SmallError::from)
    }

    pub fn append(&mut self, bytes: &[u8]) -> SmallResult<u64> {
        let pos = self.file.seek(SeekFrom::End(0)).map_err(SmallError::from)?;
        self.file.write_all(bytes).map_err(SmallError::from)?;
        Ok(pos)
    }

    pub fn flush(&mut self) -> SmallResult {
        self.file.flush().map_err(SmallError::from)?;
        self.file.sync_data().map_err(SmallError::from)
    }
}
