//! The index: one [`IndexEntry`] per stored buffer, encoded as a
//! MessagePack sequence of maps.
//!
//! Struct field order is serde's canonical map-key order for `rmp_serde`'s
//! struct-as-map mode, so encoding the same entries twice produces
//! byte-identical output. Unknown optional keys inside `info` survive
//! round-trips because `info` is a generic value map rather than a fixed
//! struct; an unrecognized
//! top-level field on `IndexEntry` itself fails closed via serde's default
//! strict deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::CodecConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub offset: u64,
    pub enc_length: u64,
    pub dec_length: u64,
    #[serde(with = "serde_bytes_array")]
    pub hash: [u8; 32],
    pub codecs: Vec<CodecConfig>,
    #[serde(default)]
    pub info: Option<BTreeMap<String, rmpv::Value>>,
}

impl IndexEntry {
    /// Whether this entry's stored bytes fit entirely before `index_offset`.
    pub fn fits_before(&self, index_offset: u64) -> bool {
        self.offset
            .checked_add(self.enc_length)
            .map(|end| end <= index_offset)
            .unwrap_or(false)
    }

    /// The buffer's byte span, for overlap checks.
    pub fn span(&self) -> (u64, u64) {
        (self.offset, self.offset + self.enc_length)
    }
}

pub fn encode_index(entries: &[IndexEntry]) -> Result<Vec<u8>> {
    // `to_vec_named` encodes each entry as a MessagePack map keyed by field
    // name (in declaration order) rather than a positional array, and is
    // stable since struct field order never changes at runtime.
    rmp_serde::to_vec_named(entries)
        .map_err(|e| Error::MalformedFrame(format!("index encode failed: {e}")))
}

pub fn decode_index(bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    rmp_serde::from_slice(bytes).map_err(|_| Error::CorruptIndex)
}

/// Checks that entries don't overlap and are non-decreasing in offset.
///
/// Offsets are strictly increasing whenever consecutive buffers occupy any
/// space at all; two zero-length buffers back-to-back legitimately tie at
/// the same offset, since neither one claims a byte of the file, so ties
/// are only rejected when they'd imply an actual overlap (checked below).
pub fn validate_entries(entries: &[IndexEntry], index_offset: u64) -> Result<()> {
    let mut last_offset: Option<u64> = None;
    let mut spans: Vec<(u64, u64)> = Vec::with_capacity(entries.len());

    for entry in entries {
        if !entry.fits_before(index_offset) {
            return Err(Error::MalformedFrame(format!(
                "entry at offset {} (len {}) extends past index_offset {}",
                entry.offset, entry.enc_length, index_offset
            )));
        }
        if let Some(prev) = last_offset {
            if entry.offset < prev {
                return Err(Error::MalformedFrame(
                    "index entries are not monotonically non-decreasing in offset".into(),
                ));
            }
        }
        last_offset = Some(entry.offset);
        spans.push(entry.span());
    }

    for i in 0..spans.len() {
        for j in (i + 1)..spans.len() {
            let (a0, a1) = spans[i];
            let (b0, b1) = spans[j];
            if a0 < b1 && b0 < a1 {
                return Err(Error::MalformedFrame(format!(
                    "overlapping buffer spans: [{a0},{a1}) and [{b0},{b1})"
                )));
            }
        }
    }

    Ok(())
}

/// `#[serde(with = ...)]` helper so `[u8; 32]` round-trips through
/// MessagePack as a compact byte string instead of a 32-element sequence.
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
        let bytes = buf.into_vec();
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("expected 32 bytes, got {}", v.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(offset: u64, len: u64) -> IndexEntry {
        IndexEntry {
            offset,
            enc_length: len,
            dec_length: len,
            hash: [1u8; 32],
            codecs: vec![],
            info: None,
        }
    }

    #[test]
    fn round_trip_is_deterministic() {
        let entries = vec![sample_entry(16, 5), sample_entry(21, 5)];
        let a = encode_index(&entries).unwrap();
        let b = encode_index(&entries).unwrap();
        assert_eq!(a, b);
        let decoded = decode_index(&a).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].offset, 16);
        assert_eq!(decoded[1].offset, 21);
    }

    #[test]
    fn validate_detects_overlap() {
        let entries = vec![sample_entry(16, 10), sample_entry(20, 10)];
        let err = validate_entries(&entries, 1000).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn validate_detects_non_monotonic_offsets() {
        let entries = vec![sample_entry(20, 5), sample_entry(16, 5)];
        let err = validate_entries(&entries, 1000).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn validate_allows_tied_offsets_for_zero_length_entries() {
        let entries = vec![sample_entry(16, 0), sample_entry(16, 0), sample_entry(16, 5)];
        validate_entries(&entries, 1000).unwrap();
    }

    #[test]
    fn validate_detects_overrun_past_index() {
        let entries = vec![sample_entry(16, 100)];
        let err = validate_entries(&entries, 50).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn info_round_trips_verbatim() {
        let mut info = BTreeMap::new();
        info.insert("dtype".to_string(), rmpv::Value::from("float32"));
        info.insert("shape".to_string(), rmpv::Value::Array(vec![
            rmpv::Value::from(4), rmpv::Value::from(8),
        ]));
        let mut entry = sample_entry(16, 5);
        entry.info = Some(info.clone());
        let bytes = encode_index(&[entry]).unwrap();
        let decoded = decode_index(&bytes).unwrap();
        assert_eq!(decoded[0].info, Some(info));
    }
}
