//! Reader: opens a container, validates header/trailer/index, and vends
//! buffers either as owned regions (eager mode) or zero-copy mapped views
//! (mapped mode).

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::{instrument, trace};

use crate::codec::{BuiltinRegistry, CodecPipeline, CodecRegistry};
use crate::digest;
use crate::error::{Error, Result};
use crate::frame::{FileHeader, FileTrailer, FILE_HEADER_SIZE, FILE_TRAILER_SIZE};
use crate::governor::{MappedBufferGovernor, MappingToken};
use crate::index::{decode_index, validate_entries, IndexEntry};

/// Per-entry verification cache: unverified / verified-good / verified-bad.
/// Stored as a tri-state byte rather than `Option<bool>` so that every
/// reader thread can update it with a single relaxed `AtomicU8` store
/// instead of going through a `Mutex`.
const UNVERIFIED: u8 = 0;
const VERIFIED_OK: u8 = 1;
const VERIFIED_BAD: u8 = 2;

/// A buffer vended by [`Reader::get_buffer`].
///
/// `Owned` is produced in eager mode, or in mapped mode whenever the
/// entry's codec chain is non-empty (mapped zero-copy is impossible once a
/// buffer is encoded). `Mapped` is produced only for empty-chain entries
/// opened in mapped mode; it borrows directly from the reader's mapping
/// and carries a [`MappingToken`] that keeps the mapping alive for as long
/// as the view itself is alive, even past the `Reader`'s own scope.
pub enum BufferView<'a> {
    Owned(Vec<u8>),
    Mapped {
        bytes: &'a [u8],
        _token: MappingToken,
    },
}

impl<'a> std::ops::Deref for BufferView<'a> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            BufferView::Owned(v) => v,
            BufferView::Mapped { bytes, .. } => bytes,
        }
    }
}

enum Backing {
    Eager(RefCell<File>),
    Mapped {
        // Kept alive alongside the mapping; never read directly once mapped.
        _file: File,
        mapping: Arc<Mmap>,
        governor: Arc<MappedBufferGovernor>,
    },
}

/// Opens a read-only file handle and, in mapped mode, one read-only
/// mapping spanning the payload region `[16, index_offset)`.
pub struct Reader {
    backing: Backing,
    header: FileHeader,
    trailer: FileTrailer,
    entries: Vec<IndexEntry>,
    verified: Vec<AtomicU8>,
    registry: Box<dyn CodecRegistry>,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>, direct: bool) -> Result<Self> {
        Self::open_with_registry(path, direct, Box::new(BuiltinRegistry))
    }

    #[instrument(skip(registry), fields(path = %path.as_ref().display(), direct))]
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        direct: bool,
        registry: Box<dyn CodecRegistry>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let file_length = file.metadata()?.len();

        if file_length < (FILE_HEADER_SIZE + FILE_TRAILER_SIZE) as u64 {
            return Err(Error::MalformedFrame(format!(
                "file too small to be a container ({file_length} bytes)"
            )));
        }

        file.seek(SeekFrom::Start(0))?;
        let header = FileHeader::read(&mut file)?;

        file.seek(SeekFrom::Start(file_length - FILE_TRAILER_SIZE as u64))?;
        let trailer = FileTrailer::read(&mut file)?;
        trailer.validate_span(file_length)?;

        file.seek(SeekFrom::Start(trailer.index_offset))?;
        let mut index_bytes = vec![0u8; trailer.index_length as usize];
        file.read_exact(&mut index_bytes)?;

        if digest::digest(&index_bytes) != trailer.index_hash {
            return Err(Error::CorruptIndex);
        }

        let entries = decode_index(&index_bytes)?;
        validate_entries(&entries, trailer.index_offset)?;

        let verified = entries.iter().map(|_| AtomicU8::new(UNVERIFIED)).collect();

        let backing = if direct {
            // SAFETY: the file is opened read-only for the lifetime of this
            // `Reader` and is never truncated or modified underneath the
            // mapping by this process — the format is append-only at
            // construction and read-only afterwards.
            let mapping = unsafe { Mmap::map(&file)? };
            Backing::Mapped {
                _file: file,
                mapping: Arc::new(mapping),
                governor: Arc::new(MappedBufferGovernor::new()),
            }
        } else {
            Backing::Eager(RefCell::new(file))
        };

        trace!(entries = entries.len(), direct, "archive opened");

        Ok(Self {
            backing,
            header,
            trailer,
            entries,
            verified,
            registry,
        })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn format_version(&self) -> u16 {
        self.header.version
    }

    fn verify_stored(&self, index: usize, stored: &[u8]) -> Result<()> {
        match self.verified[index].load(Ordering::Acquire) {
            VERIFIED_OK => return Ok(()),
            VERIFIED_BAD => return Err(Error::CorruptBuffer { index }),
            _ => {}
        }
        let ok = digest::digest(stored) == self.entries[index].hash;
        self.verified[index].store(if ok { VERIFIED_OK } else { VERIFIED_BAD }, Ordering::Release);
        if ok {
            Ok(())
        } else {
            Err(Error::CorruptBuffer { index })
        }
    }

    /// Return the buffer at `index`. Eager mode always copies and decodes;
    /// mapped mode returns a zero-copy view for empty-chain entries and
    /// degrades to eager semantics (a copy) otherwise.
    #[instrument(skip(self))]
    pub fn get_buffer(&self, index: usize) -> Result<BufferView<'_>> {
        let entry = self
            .entries
            .get(index)
            .ok_or(Error::IndexOutOfRange(index, self.entries.len()))?;

        match &self.backing {
            Backing::Eager(file) => {
                let mut file = file.borrow_mut();
                file.seek(SeekFrom::Start(entry.offset))?;
                let mut stored = vec![0u8; entry.enc_length as usize];
                file.read_exact(&mut stored)?;
                self.verify_stored(index, &stored)?;
                let pipeline = CodecPipeline::new(self.registry.as_ref());
                let decoded = pipeline.decode(&stored, &entry.codecs, entry.dec_length)?;
                Ok(BufferView::Owned(decoded))
            }
            Backing::Mapped {
                mapping, governor, ..
            } => {
                let start = entry.offset as usize;
                let end = start + entry.enc_length as usize;
                let stored = &mapping[start..end];
                self.verify_stored(index, stored)?;

                if entry.codecs.is_empty() {
                    let token = governor.vend(Arc::clone(mapping));
                    Ok(BufferView::Mapped { bytes: stored, _token: token })
                } else {
                    let pipeline = CodecPipeline::new(self.registry.as_ref());
                    let decoded = pipeline.decode(stored, &entry.codecs, entry.dec_length)?;
                    Ok(BufferView::Owned(decoded))
                }
            }
        }
    }

    /// Number of mapped views still outstanding. Always zero in eager mode.
    pub fn live_view_count(&self) -> usize {
        match &self.backing {
            Backing::Eager(_) => 0,
            Backing::Mapped { governor, .. } => governor.live_count(),
        }
    }

    /// Close the reader. Eager mode closes unconditionally. Mapped mode
    /// refuses with `BuffersStillLive` while any vended view is still held,
    /// returning `self` so the caller can drop views and retry.
    pub fn close(self) -> std::result::Result<(), (Self, Error)> {
        let live = self.live_view_count();
        if live > 0 {
            return Err((self, Error::BuffersStillLive(live)));
        }
        Ok(())
    }
}
