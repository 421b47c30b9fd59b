//! Streaming SHA-256 over buffer spans.
//!
//! The writer feeds each encoded buffer through a [`DigestEngine`] while it
//! is being streamed to the sink, so integrity hashing never costs a second
//! pass over the data. The reader uses the one-shot [`digest`] helper to
//! re-hash stored bytes on demand.

use sha2::{Digest, Sha256};

pub struct DigestEngine {
    hasher: Sha256,
}

impl DigestEngine {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

impl Default for DigestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot digest of a complete byte span.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut engine = DigestEngine::new();
    engine.update(bytes);
    engine.finalize()
}
