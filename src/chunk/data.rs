//! The StoredChunk type - a chunk as read back from storage.

use bytes::Bytes;
use std::fmt;

use super::ChunkHash;

/// A deduplicated chunk held by a storage engine.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use chunksaver::{ChunkHash, StoredChunk};
///
/// let chunk = StoredChunk {
///     hash: ChunkHash::new([0u8; 32]),
///     data: Bytes::from_static(b"hello world"),
///     ref_count: 2,
/// };
///
/// assert_eq!(chunk.len(), 11);
/// ```
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Content address of the chunk.
    pub hash: ChunkHash,

    /// The raw chunk bytes, already decompressed.
    pub data: Bytes,

    /// How many manifest entries reference this chunk.
    pub ref_count: u64,
}

impl StoredChunk {
    /// Returns the length of the chunk data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the chunk has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the chunk and returns the underlying data.
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl fmt::Display for StoredChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk({} bytes, refs={}, hash={})",
            self.len(),
            self.ref_count,
            self.hash
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let chunk = StoredChunk {
            hash: ChunkHash::new([0u8; 32]),
            data: Bytes::from_static(b"hello"),
            ref_count: 3,
        };
        let s = chunk.to_string();
        assert!(s.contains("5 bytes"));
        assert!(s.contains("refs=3"));
    }

    #[test]
    fn test_into_data() {
        let chunk = StoredChunk {
            hash: ChunkHash::new([0u8; 32]),
            data: Bytes::from_static(b""),
            ref_count: 1,
        };
        assert!(chunk.is_empty());
        assert!(chunk.into_data().is_empty());
    }
}
