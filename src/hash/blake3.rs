//! BLAKE3-based chunk hashing.

use crate::chunk::ChunkHash;

/// Incremental BLAKE3 hasher.
///
/// The chunk buffer feeds it on every write so the digest is ready the
/// moment a chunk is flushed.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    state: blake3::Hasher,
}

impl ContentHasher {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the hasher with more data.
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Returns the digest of everything fed since the last reset.
    pub fn finalize(&self) -> ChunkHash {
        ChunkHash::new(self.state.finalize().into())
    }

    /// Resets the hasher to its initial state.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Hashes data in one shot.
    pub fn digest(data: &[u8]) -> ChunkHash {
        ChunkHash::new(blake3::hash(data).into())
    }
}
