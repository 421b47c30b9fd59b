//! Codec pipeline: a chain of named, configured transforms.
//!
//! A codec is identified by a short string id plus a configuration map
//! consumed by a [`CodecRegistry`]. The pipeline applies the chain
//! first-to-last on encode and last-to-first on decode. The core never
//! hard-codes an implementation beyond a small built-in set — the registry
//! is an injectable seam so an embedder can register additional codecs
//! without touching this module.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One entry in a codec chain: an id plus free-form parameters.
///
/// Equal to the wire representation stored in an `IndexEntry`'s `codecs`
/// field — encoded as part of the index, never interpreted by the core
/// beyond dispatch through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    pub id: String,
    #[serde(default)]
    pub params: BTreeMap<String, rmpv::Value>,
}

impl CodecConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_level(id: impl Into<String>, level: i32) -> Self {
        let mut params = BTreeMap::new();
        params.insert("level".to_string(), rmpv::Value::from(level));
        Self {
            id: id.into(),
            params,
        }
    }

    pub fn level(&self) -> Option<i32> {
        self.params.get("level").and_then(|v| v.as_i64()).map(|v| v as i32)
    }
}

/// A single compress/decompress transform.
pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8], config: &CodecConfig) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8], config: &CodecConfig) -> Result<Vec<u8>>;
}

/// Resolves a [`CodecConfig`] to a live [`Codec`] implementation.
///
/// Injectable so an embedder can supply codecs this crate doesn't know
/// about; `BuiltinRegistry` is the default, covering the identity codec
/// plus zstd, lz4, and brotli.
pub trait CodecRegistry {
    fn resolve(&self, config: &CodecConfig) -> Result<Box<dyn Codec>>;
}

struct NoneCodec;
impl Codec for NoneCodec {
    fn compress(&self, data: &[u8], _config: &CodecConfig) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
    fn decompress(&self, data: &[u8], _config: &CodecConfig) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

struct ZstdCodec;
impl Codec for ZstdCodec {
    fn compress(&self, data: &[u8], config: &CodecConfig) -> Result<Vec<u8>> {
        let level = config.level().unwrap_or(3);
        zstd::encode_all(data, level).map_err(Error::Io)
    }
    fn decompress(&self, data: &[u8], _config: &CodecConfig) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(Error::Io)
    }
}

struct Lz4Codec;
impl Codec for Lz4Codec {
    fn compress(&self, data: &[u8], _config: &CodecConfig) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8], _config: &CodecConfig) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| {
            Error::MalformedFrame(format!("lz4 decompress failed: {e}"))
        })
    }
}

struct BrotliCodec;
impl Codec for BrotliCodec {
    fn compress(&self, data: &[u8], config: &CodecConfig) -> Result<Vec<u8>> {
        let quality = config.level().unwrap_or(9).clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data)?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8], _config: &CodecConfig) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        brotli::Decompressor::new(data, 4096).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Default registry covering the codecs this crate ships with.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRegistry;

impl CodecRegistry for BuiltinRegistry {
    fn resolve(&self, config: &CodecConfig) -> Result<Box<dyn Codec>> {
        match config.id.as_str() {
            "none" => Ok(Box::new(NoneCodec)),
            "zstd" => Ok(Box::new(ZstdCodec)),
            "lz4" => Ok(Box::new(Lz4Codec)),
            "brotli" => Ok(Box::new(BrotliCodec)),
            other => Err(Error::UnknownCodec { id: other.to_string() }),
        }
    }
}

/// Resolves and applies an ordered codec chain.
pub struct CodecPipeline<'a> {
    registry: &'a dyn CodecRegistry,
}

impl<'a> CodecPipeline<'a> {
    pub fn new(registry: &'a dyn CodecRegistry) -> Self {
        Self { registry }
    }

    /// Apply `chain` first-to-last. An empty chain is the identity
    /// transform. Returns the encoded bytes; their length is the
    /// authoritative `enc_length` for the resulting `IndexEntry` regardless
    /// of whether any codec in the chain has a predictable output size.
    pub fn encode(&self, data: &[u8], chain: &[CodecConfig]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for config in chain {
            let codec = self.registry.resolve(config)?;
            current = codec.compress(&current, config)?;
        }
        Ok(current)
    }

    /// Apply the inverse of `chain` last-to-first. Verifies the final
    /// decoded length against `dec_length`, failing with
    /// `Error::DecodeMismatch` on disagreement.
    pub fn decode(&self, data: &[u8], chain: &[CodecConfig], dec_length: u64) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for config in chain.iter().rev() {
            let codec = self.registry.resolve(config)?;
            current = codec.decompress(&current, config)?;
        }
        if current.len() as u64 != dec_length {
            return Err(Error::DecodeMismatch {
                expected: dec_length,
                actual: current.len() as u64,
            });
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_chain_round_trips() {
        let registry = BuiltinRegistry;
        let pipeline = CodecPipeline::new(&registry);
        let data = b"hello world";
        let encoded = pipeline.encode(data, &[]).unwrap();
        assert_eq!(encoded, data);
        let decoded = pipeline.decode(&encoded, &[], data.len() as u64).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn zstd_round_trips() {
        let registry = BuiltinRegistry;
        let pipeline = CodecPipeline::new(&registry);
        let data = vec![0u8; 10_000];
        let chain = vec![CodecConfig::with_level("zstd", 3)];
        let encoded = pipeline.encode(&data, &chain).unwrap();
        assert!(encoded.len() < data.len());
        let decoded = pipeline.decode(&encoded, &chain, data.len() as u64).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn chained_codecs_apply_in_order() {
        let registry = BuiltinRegistry;
        let pipeline = CodecPipeline::new(&registry);
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
        let chain = vec![CodecConfig::new("lz4"), CodecConfig::with_level("zstd", 5)];
        let encoded = pipeline.encode(&data, &chain).unwrap();
        let decoded = pipeline.decode(&encoded, &chain, data.len() as u64).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn unknown_codec_fails() {
        let registry = BuiltinRegistry;
        let pipeline = CodecPipeline::new(&registry);
        let chain = vec![CodecConfig::new("made-up")];
        let err = pipeline.encode(b"x", &chain).unwrap_err();
        assert!(matches!(err, Error::UnknownCodec { id } if id == "made-up"));
    }

    #[test]
    fn decode_mismatch_is_detected() {
        let registry = BuiltinRegistry;
        let pipeline = CodecPipeline::new(&registry);
        let encoded = pipeline.encode(b"hello", &[]).unwrap();
        let err = pipeline.decode(&encoded, &[], 999).unwrap_err();
        assert!(matches!(err, Error::DecodeMismatch { .. }));
    }
}
