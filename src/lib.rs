//! # binpickle — container format for persisting large heterogeneous
//! in-memory objects
//!
//! Format guarantees:
//! - All multi-byte integers are little-endian
//! - The file is a flat header, a payload region of stored buffers, an
//!   index, and a trailer — in that order, written in a single forward
//!   pass and never rewritten except for the header's payload length
//! - Every buffer is independently hashed (SHA-256) over its *encoded*
//!   bytes; the index itself is hashed the same way and that hash lives
//!   in the trailer
//! - A buffer with an empty codec chain may be opened directly against
//!   the file's mmap; any non-empty codec chain always yields an owned,
//!   decoded copy
//! - Codec identity is a short string id resolved through an injectable
//!   [`codec::CodecRegistry`] — no frozen UUID table, no FFI plugin ABI
//!
//! ```no_run
//! use binpickle::{create, open, codec::CodecConfig};
//!
//! let mut writer = create("example.bpck").unwrap();
//! writer.write_buffer(b"raw bytes", &[], None, true).unwrap();
//! writer.write_buffer(b"compress me", &[CodecConfig::with_level("zstd", 3)], None, false).unwrap();
//! writer.finalize().unwrap();
//! writer.close().unwrap();
//!
//! let reader = open("example.bpck", true).unwrap();
//! let first = reader.get_buffer(0).unwrap();
//! assert_eq!(&*first, b"raw bytes");
//! ```

pub mod codec;
pub mod digest;
pub mod error;
pub mod frame;
pub mod governor;
pub mod index;
pub mod reader;
pub mod writer;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub use codec::{Codec, CodecConfig, CodecPipeline, CodecRegistry};
pub use digest::DigestEngine;
pub use error::{Error, Result};
pub use frame::{FileHeader, FileTrailer, FILE_HEADER_SIZE, FILE_TRAILER_SIZE};
pub use governor::{MappedBufferGovernor, MappingToken};
pub use index::IndexEntry;
pub use reader::{BufferView, Reader};
pub use writer::Writer;

/// Open a container for reading. `direct` selects mapped mode: empty-chain
/// buffers are returned as zero-copy views over the file's mmap, while
/// non-empty-chain buffers always decode into an owned copy regardless of
/// the mode. Pass `direct = false` for eager mode, where every buffer is
/// copied and decoded up front into an owned `Vec<u8>`.
pub fn open(path: impl AsRef<Path>, direct: bool) -> Result<Reader> {
    Reader::open(path, direct)
}

/// Create a new container at `path`, truncating any existing file.
pub fn create(path: impl AsRef<Path>) -> Result<Writer<BufWriter<File>>> {
    let file = File::create(path)?;
    Ok(Writer::new(BufWriter::new(file)))
}
