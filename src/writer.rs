//! Streaming, single-threaded writer: `Open -> Writing -> Finalized ->
//! Closed`, with a sticky terminal `Failed` state on codec error.
//!
//! Reserves space for the header up front, streams each buffer through the
//! codec pipeline while feeding a digest engine in the same pass,
//! accumulates an in-memory index, and back-patches the header once the
//! true payload length is known at `finalize()`.

use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};

use tracing::{debug, instrument};

use crate::codec::{BuiltinRegistry, CodecConfig, CodecPipeline, CodecRegistry};
use crate::digest::DigestEngine;
use crate::error::{Error, Result};
use crate::frame::{FileHeader, FileTrailer, FILE_HEADER_SIZE};
use crate::index::{encode_index, validate_entries, IndexEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Writing,
    Finalized,
    Closed,
    Failed,
}

/// Queries the host page size once via `sysconf(_SC_PAGESIZE)`.
fn page_size() -> u64 {
    // SAFETY: `sysconf` with `_SC_PAGESIZE` has no preconditions and never
    // fails on any POSIX target; a negative return is not possible for this
    // parameter.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

/// Stateful builder that streams buffers to a writable sink.
///
/// One owner, no interior concurrency: created once via [`crate::create`],
/// fed buffers with [`Writer::write_buffer`], finalized exactly once, then
/// discarded.
pub struct Writer<W: Write + Seek> {
    sink: W,
    state: State,
    index: Vec<IndexEntry>,
    position: u64,
    registry: Box<dyn CodecRegistry>,
    page_size: u64,
}

impl<W: Write + Seek> Writer<W> {
    pub fn new(sink: W) -> Self {
        Self::with_registry(sink, Box::new(BuiltinRegistry))
    }

    pub fn with_registry(sink: W, registry: Box<dyn CodecRegistry>) -> Self {
        Self {
            sink,
            state: State::Open,
            index: Vec::new(),
            position: 0,
            registry,
            page_size: page_size(),
        }
    }

    fn ensure_header_written(&mut self) -> Result<()> {
        if self.state == State::Open {
            // Placeholder header; payload_length is back-patched at
            // finalize() once the true length is known.
            FileHeader::new(0).write(&mut self.sink)?;
            self.position = FILE_HEADER_SIZE as u64;
            self.state = State::Writing;
        }
        Ok(())
    }

    /// Append one buffer: optional page-alignment padding, stream-encode-
    /// and-hash in one pass, then record the `IndexEntry`.
    #[instrument(skip(self, data, info), fields(len = data.len()))]
    pub fn write_buffer(
        &mut self,
        data: &[u8],
        codecs: &[CodecConfig],
        info: Option<BTreeMap<String, rmpv::Value>>,
        align_for_mapping: bool,
    ) -> Result<()> {
        match self.state {
            State::Failed => return Err(Error::WriterFailed),
            State::Finalized | State::Closed => {
                return Err(Error::MalformedFrame(
                    "write_buffer called after finalize".into(),
                ))
            }
            State::Open | State::Writing => {}
        }

        self.ensure_header_written()?;

        // Step 1: alignment is advisory — only applies to an empty codec
        // chain, since mapped zero-copy access is impossible once a buffer
        // is encoded.
        if codecs.is_empty() && align_for_mapping {
            let remainder = self.position % self.page_size;
            if remainder != 0 {
                let pad = self.page_size - remainder;
                self.write_raw(&vec![0u8; pad as usize])?;
            }
        }

        let offset = self.position;

        // Step 2: encode and hash in one streaming pass. The pipeline
        // itself buffers in memory (codec libraries operate on whole
        // buffers), but the *sink* write and digest update happen together
        // so there is exactly one traversal of the encoded bytes.
        let pipeline = CodecPipeline::new(self.registry.as_ref());
        let encoded = match pipeline.encode(data, codecs) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.state = State::Failed;
                return Err(err);
            }
        };

        let mut engine = DigestEngine::new();
        engine.update(&encoded);
        let hash = engine.finalize();

        if let Err(err) = self.write_raw(&encoded) {
            self.state = State::Failed;
            return Err(err);
        }

        self.index.push(IndexEntry {
            offset,
            enc_length: encoded.len() as u64,
            dec_length: data.len() as u64,
            hash,
            codecs: codecs.to_vec(),
            info,
        });

        debug!(offset, enc_length = encoded.len(), "buffer written");
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Emit the index blob, compute its digest, write the 44-byte trailer,
    /// back-patch the header, and flush. Must be called exactly once.
    /// Returns the total file length.
    #[instrument(skip(self))]
    pub fn finalize(&mut self) -> Result<u64> {
        match self.state {
            State::Failed => return Err(Error::WriterFailed),
            State::Closed => {
                return Err(Error::MalformedFrame("finalize called after close".into()))
            }
            State::Finalized => return Err(Error::MalformedFrame("finalize called twice".into())),
            State::Open => self.ensure_header_written()?,
            State::Writing => {}
        }

        let index_offset = self.position;
        validate_entries(&self.index, index_offset)?;

        let index_bytes = encode_index(&self.index)?;
        let index_length = index_bytes.len() as u32;
        self.write_raw(&index_bytes)?;

        let mut engine = DigestEngine::new();
        engine.update(&index_bytes);
        let index_hash = engine.finalize();

        let trailer = FileTrailer {
            index_offset,
            index_length,
            index_hash,
        };
        trailer.write(&mut self.sink)?;
        self.position += crate::frame::FILE_TRAILER_SIZE as u64;

        // Back-patch the header's payload_length now that the payload
        // region's true size (everything between the header and the
        // index) is known. The only backward seek this writer ever makes.
        let payload_length = index_offset - FILE_HEADER_SIZE as u64;
        self.sink.seek(SeekFrom::Start(0))?;
        FileHeader::new(payload_length).write(&mut self.sink)?;
        self.sink.seek(SeekFrom::Start(self.position))?;

        self.sink.flush()?;
        self.state = State::Finalized;

        debug!(index_offset, index_length, total_len = self.position, "finalized");
        Ok(self.position)
    }

    pub fn close(mut self) -> Result<()> {
        match self.state {
            State::Finalized => {
                self.state = State::Closed;
                Ok(())
            }
            State::Failed => Err(Error::WriterFailed),
            _ => Err(Error::MalformedFrame("close called before finalize".into())),
        }
    }

    /// Entries recorded so far, in write order. Exposed for tests and
    /// embedders that want to inspect the index before finalizing.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_writer() -> Writer<Cursor<Vec<u8>>> {
        Writer::new(Cursor::new(Vec::new()))
    }

    #[test]
    fn empty_buffer_round_trips_length() {
        let mut w = new_writer();
        w.write_buffer(b"", &[], None, false).unwrap();
        let total_len = w.finalize().unwrap();
        assert_eq!(w.entries().len(), 1);
        assert_eq!(w.entries()[0].enc_length, 0);
        assert!(total_len > 0);
    }

    #[test]
    fn two_buffers_no_codec_no_alignment() {
        let mut w = new_writer();
        w.write_buffer(b"hello", &[], None, false).unwrap();
        w.write_buffer(b"world", &[], None, false).unwrap();
        w.finalize().unwrap();
        assert_eq!(w.entries()[0].offset, FILE_HEADER_SIZE as u64);
        assert_eq!(w.entries()[1].offset, FILE_HEADER_SIZE as u64 + 5);
    }

    #[test]
    fn alignment_pads_to_page_boundary() {
        let mut w = new_writer();
        let ps = page_size();
        w.write_buffer(&vec![0u8; 4096], &[], None, true).unwrap();
        assert_eq!(w.entries()[0].offset % ps, 0);
    }

    #[test]
    fn alignment_ignored_with_nonempty_codec_chain() {
        let mut w = new_writer();
        let chain = vec![CodecConfig::new("none")];
        w.write_buffer(b"hello", &chain, None, true).unwrap();
        // "none" is a non-empty chain, so alignment is advisory-only and
        // skipped; offset stays right after the header.
        assert_eq!(w.entries()[0].offset, FILE_HEADER_SIZE as u64);
    }

    #[test]
    fn unknown_codec_transitions_writer_to_failed() {
        let mut w = new_writer();
        let chain = vec![CodecConfig::new("nonexistent")];
        assert!(w.write_buffer(b"x", &chain, None, false).is_err());
        let err = w.write_buffer(b"y", &[], None, false).unwrap_err();
        assert!(matches!(err, Error::WriterFailed));
    }

    #[test]
    fn offsets_strictly_increase_across_codec_buffers() {
        let mut w = new_writer();
        let chain = vec![CodecConfig::with_level("zstd", 3)];
        w.write_buffer(&vec![0u8; 5000], &chain, None, false).unwrap();
        w.write_buffer(&vec![1u8; 5000], &chain, None, false).unwrap();
        let entries = w.entries();
        assert!(entries[1].offset > entries[0].offset);
    }
}
