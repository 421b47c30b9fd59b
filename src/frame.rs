//! Frame layout — file header and trailer.
//!
//! # On-disk layout, FileHeader (16 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic          = "BPCK"  (4 ASCII bytes, not LE)
//!    4      2   version        = 2       (LE u16)
//!    6      2   reserved       = 0       (LE u16, must be zero)
//!    8      8   payload_length           (LE u64)
//! ```
//!
//! `payload_length` is redundant with the trailer (it is back-patched once
//! the true length is known at `finalize()`), but lets a reader sanity-check
//! the file from the first 16 bytes alone.
//!
//! # On-disk layout, FileTrailer (44 bytes, always the last bytes of the file)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   index_offset   (LE u64)
//!    8      4   index_length   (LE u32)
//!   12     32   index_hash     SHA-256 of the encoded index blob
//! ```
//!
//! 8 + 4 + 32 sums to exactly 44 bytes — there is no alignment padding byte
//! between `index_length` and `index_hash`.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub const MAGIC: &[u8; 4] = b"BPCK";
pub const FORMAT_VERSION: u16 = 2;

pub const FILE_HEADER_SIZE: usize = 16;
pub const FILE_TRAILER_SIZE: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub payload_length: u64,
}

impl FileHeader {
    pub fn new(payload_length: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            payload_length,
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&0u16.to_le_bytes());
        buf[8..16].copy_from_slice(&self.payload_length.to_le_bytes());
        w.write_all(&buf)
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        r.read_exact(&mut buf)?;

        if &buf[0..4] != MAGIC {
            return Err(Error::MalformedFrame(
                "invalid magic — not a BinPickle container".into(),
            ));
        }

        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version, FORMAT_VERSION));
        }

        let reserved = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        if reserved != 0 {
            return Err(Error::MalformedFrame(format!(
                "reserved header bytes must be zero, got {reserved:#06x}"
            )));
        }

        let payload_length = u64::from_le_bytes(buf[8..16].try_into().unwrap());

        Ok(Self {
            version,
            payload_length,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTrailer {
    pub index_offset: u64,
    pub index_length: u32,
    pub index_hash: [u8; 32],
}

impl FileTrailer {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = [0u8; FILE_TRAILER_SIZE];
        buf[0..8].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.index_length.to_le_bytes());
        buf[12..44].copy_from_slice(&self.index_hash);
        w.write_all(&buf)
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; FILE_TRAILER_SIZE];
        r.read_exact(&mut buf)?;

        let index_offset = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let index_length = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let index_hash: [u8; 32] = buf[12..44].try_into().unwrap();

        Ok(Self {
            index_offset,
            index_length,
            index_hash,
        })
    }

    /// Validate that the trailer's span exactly covers the tail of the
    /// file: `index_offset + index_length + 44 == file_length`.
    pub fn validate_span(&self, file_length: u64) -> Result<()> {
        let expected_end = self
            .index_offset
            .checked_add(self.index_length as u64)
            .and_then(|v| v.checked_add(FILE_TRAILER_SIZE as u64))
            .ok_or_else(|| Error::MalformedFrame("trailer span overflows u64".into()))?;

        if expected_end != file_length {
            return Err(Error::MalformedFrame(format!(
                "trailer span {expected_end} does not cover file length {file_length}"
            )));
        }
        Ok(())
    }
}
