//! Crate-wide error taxonomy.
//!
//! One flat enum rather than one per module — a caller dealing with an
//! open archive doesn't care which internal component raised a given
//! failure.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unsupported format version {0} (this build reads version {1})")]
    UnsupportedVersion(u16, u16),

    #[error("Index digest mismatch — archive index is corrupt")]
    CorruptIndex,

    #[error("Buffer {index} digest mismatch — stored bytes are corrupt")]
    CorruptBuffer { index: usize },

    #[error("Unknown codec '{id}' — not available in this build's registry")]
    UnknownCodec { id: String },

    #[error("Decoded length mismatch: chain produced {actual} bytes, expected {expected}")]
    DecodeMismatch { expected: u64, actual: u64 },

    #[error("Cannot close reader: {0} mapped buffer view(s) still live")]
    BuffersStillLive(usize),

    #[error("Writer is in a failed state and cannot accept further writes")]
    WriterFailed,

    #[error("Buffer index {0} out of range ({1} entries)")]
    IndexOutOfRange(usize, usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
