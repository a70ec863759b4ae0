//! Manifest entries.

use serde::{Deserialize, Serialize};

use super::ChunkHash;

/// Records one chunk of one message: its hash, size and the MIME part it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Content address of the chunk.
    pub hash: ChunkHash,

    /// Raw (uncompressed) size in bytes.
    pub size: u64,

    /// Node label of the owning MIME part, e.g. `"1.2"`. Empty when the
    /// part carried no label.
    pub part: String,

    /// `Content-Type` of the owning part, if it declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// The ordered chunk descriptors of a message.
///
/// Concatenating the referenced chunks in order reproduces the original
/// stream byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    chunks: Vec<ChunkDescriptor>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a descriptor.
    pub fn push(&mut self, descriptor: ChunkDescriptor) {
        self.chunks.push(descriptor);
    }

    /// Sum of all chunk sizes.
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if no chunk was recorded.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Iterates the descriptors in stream order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChunkDescriptor> {
        self.chunks.iter()
    }

    /// Returns the descriptors as a slice.
    pub fn as_slice(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// Removes every descriptor.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ChunkDescriptor;
    type IntoIter = std::slice::Iter<'a, ChunkDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

impl FromIterator<ChunkDescriptor> for Manifest {
    fn from_iter<I: IntoIterator<Item = ChunkDescriptor>>(iter: I) -> Self {
        Self {
            chunks: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(byte: u8, size: u64) -> ChunkDescriptor {
        ChunkDescriptor {
            hash: ChunkHash::new([byte; 32]),
            size,
            part: "1".to_string(),
            content_type: None,
        }
    }

    #[test]
    fn test_total_size() {
        let manifest: Manifest = [descriptor(1, 10), descriptor(2, 5)].into_iter().collect();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.total_size(), 15);
    }

    #[test]
    fn test_clear() {
        let mut manifest = Manifest::new();
        manifest.push(descriptor(1, 3));
        manifest.clear();
        assert!(manifest.is_empty());
        assert_eq!(manifest.total_size(), 0);
    }

    #[test]
    fn test_serializes_as_list() {
        let mut manifest = Manifest::new();
        manifest.push(descriptor(1, 3));
        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json.is_array());
        assert!(json[0].get("content_type").is_none());

        let back: Manifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, manifest);
    }
}
