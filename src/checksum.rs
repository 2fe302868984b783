// Running SHA-1 over the audio region of a TAF
//
// Every byte written after the reserved header block goes through here, in
// write order and exactly once. The digest and byte count end up in the
// tonie header.

use sha1::{Digest, Sha1};

pub const SHA1_DIGEST_SIZE: usize = 20;

/// Incremental hash plus byte counter of the emitted audio region
#[derive(Clone, Default)]
pub struct StreamChecksum {
    hasher: Sha1,
    length: u64,
}

impl std::fmt::Debug for StreamChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChecksum")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl StreamChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next emitted bytes
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.length += bytes.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn finalize(self) -> [u8; SHA1_DIGEST_SIZE] {
        self.hasher.finalize().into()
    }
}

/// SHA-1 of a complete buffer
pub fn sha1_digest(data: &[u8]) -> [u8; SHA1_DIGEST_SIZE] {
    Sha1::digest(data).into()
}
