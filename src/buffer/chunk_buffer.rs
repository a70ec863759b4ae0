//! Accumulates, hashes and stores the chunk being built.

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::chunk::{ChunkDescriptor, Manifest};
use crate::config::DEFAULT_CHUNK_MAX_BYTES;
use crate::error::StorageError;
use crate::hash::ContentHasher;
use crate::mime::MimePart;
use crate::storage::ChunkStorage;

#[derive(Debug, Clone, Default)]
struct PartRef {
    node: String,
    content_type: Option<String>,
}

/// Buffer for the chunk currently being built.
///
/// Bytes are appended with [`write`](Self::write). When the buffer reaches
/// its cap it flushes on its own, so a chunk never exceeds the cap. Every
/// flush hashes the buffered bytes, hands them to the storage engine's
/// dedup operation and appends a descriptor to the message manifest.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chunksaver::{ChunkBuffer, MemoryStorage, MimePart};
///
/// let mut buffer = ChunkBuffer::new();
/// buffer.cap_to(10);
/// buffer.set_storage(Arc::new(MemoryStorage::new()));
/// buffer.current_part(&MimePart::new("1", 0, 0));
///
/// buffer.write(&[b'x'; 25])?;
/// buffer.flush()?;
///
/// let sizes: Vec<u64> = buffer.manifest().iter().map(|c| c.size).collect();
/// assert_eq!(sizes, [10, 10, 5]);
/// # Ok::<(), chunksaver::StorageError>(())
/// ```
pub struct ChunkBuffer {
    buf: Vec<u8>,
    cap: usize,
    hasher: ContentHasher,
    part: PartRef,
    manifest: Manifest,
    storage: Option<Arc<dyn ChunkStorage>>,
}

impl ChunkBuffer {
    /// Creates an empty buffer capped at the default chunk size.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            cap: DEFAULT_CHUNK_MAX_BYTES,
            hasher: ContentHasher::new(),
            part: PartRef::default(),
            manifest: Manifest::new(),
            storage: None,
        }
    }

    /// Sets the size at which the buffer flushes on its own. Zero selects
    /// the default.
    pub fn cap_to(&mut self, max_bytes: usize) {
        self.cap = if max_bytes == 0 {
            DEFAULT_CHUNK_MAX_BYTES
        } else {
            max_bytes
        };
        self.buf.reserve(self.cap.saturating_sub(self.buf.len()));
    }

    /// Returns the cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Injects the storage engine chunks are flushed to.
    pub fn set_storage(&mut self, storage: Arc<dyn ChunkStorage>) {
        self.storage = Some(storage);
    }

    /// Attributes every byte written from now on, up to the next flush, to
    /// `part`.
    pub fn current_part(&mut self, part: &MimePart) {
        self.part = PartRef {
            node: part.node.clone(),
            content_type: part.content_type().map(str::to_owned),
        };
    }

    /// Appends bytes to the chunk, flushing each time the cap is reached.
    ///
    /// Returns the number of bytes consumed, which is always `data.len()`
    /// on success.
    ///
    /// # Errors
    ///
    /// Propagates a failure of a cap-triggered flush. Bytes before the
    /// failing flush stay buffered.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, StorageError> {
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.cap.saturating_sub(self.buf.len());
            if room == 0 {
                self.flush()?;
                continue;
            }
            let (head, tail) = rest.split_at(room.min(rest.len()));
            self.buf.extend_from_slice(head);
            self.hasher.update(head);
            rest = tail;
            if self.buf.len() >= self.cap {
                trace!(size = self.buf.len(), "chunk reached cap");
                self.flush()?;
            }
        }
        Ok(data.len())
    }

    /// Finalizes the buffered chunk.
    ///
    /// Does nothing when the buffer is empty. Otherwise stores the chunk
    /// through the dedup operation, records its descriptor and clears the
    /// buffer.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] when no storage was set,
    /// or the engine's error. The buffer is left intact on failure.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let storage = self.storage.as_ref().ok_or(StorageError::NotInitialized)?;
        let hash = self.hasher.finalize();
        let existed = storage.add_chunk(&hash, &self.buf)?;
        trace!(%hash, size = self.buf.len(), part = %self.part.node, existed, "chunk flushed");

        self.manifest.push(ChunkDescriptor {
            hash,
            size: self.buf.len() as u64,
            part: self.part.node.clone(),
            content_type: self.part.content_type.clone(),
        });
        self.buf.clear();
        self.hasher.reset();
        Ok(())
    }

    /// Discards the manifest and any unflushed bytes, readying the buffer
    /// for the next message.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.hasher.reset();
        self.part = PartRef::default();
        self.manifest.clear();
    }

    /// Takes the manifest accumulated so far and resets the buffer.
    pub fn take_manifest(&mut self) -> Manifest {
        let manifest = mem::take(&mut self.manifest);
        self.reset();
        manifest
    }

    /// Returns the manifest accumulated so far.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Number of bytes waiting for the next flush.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkBuffer")
            .field("buffered", &self.buf.len())
            .field("cap", &self.cap)
            .field("part", &self.part.node)
            .field("chunks", &self.manifest.len())
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHasher;
    use crate::storage::MemoryStorage;

    fn buffer_with(cap: usize) -> (Arc<MemoryStorage>, ChunkBuffer) {
        let storage = Arc::new(MemoryStorage::new());
        let mut buffer = ChunkBuffer::new();
        buffer.cap_to(cap);
        buffer.set_storage(storage.clone());
        (storage, buffer)
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let (storage, mut buffer) = buffer_with(16);
        buffer.flush().unwrap();
        buffer.flush().unwrap();
        assert!(buffer.manifest().is_empty());
        assert_eq!(storage.chunk_count(), 0);
    }

    #[test]
    fn test_flush_without_storage() {
        let mut buffer = ChunkBuffer::new();
        buffer.write(b"abc").unwrap();
        assert!(matches!(buffer.flush(), Err(StorageError::NotInitialized)));
        assert_eq!(buffer.buffered_len(), 3);
    }

    #[test]
    fn test_write_splits_at_cap() {
        let (_storage, mut buffer) = buffer_with(10);
        assert_eq!(buffer.write(&[7u8; 25]).unwrap(), 25);
        assert_eq!(buffer.manifest().len(), 2);
        assert_eq!(buffer.buffered_len(), 5);

        buffer.flush().unwrap();
        let sizes: Vec<u64> = buffer.manifest().iter().map(|c| c.size).collect();
        assert_eq!(sizes, [10, 10, 5]);
    }

    #[test]
    fn test_exact_cap_flushes() {
        let (_storage, mut buffer) = buffer_with(4);
        buffer.write(b"abcd").unwrap();
        assert_eq!(buffer.buffered_len(), 0);
        assert_eq!(buffer.manifest().len(), 1);
    }

    #[test]
    fn test_hash_covers_all_writes() {
        let (storage, mut buffer) = buffer_with(64);
        buffer.write(b"hello ").unwrap();
        buffer.write(b"world").unwrap();
        buffer.flush().unwrap();

        let descriptor = &buffer.manifest().as_slice()[0];
        assert_eq!(descriptor.hash, ContentHasher::digest(b"hello world"));
        assert_eq!(
            storage.get_chunk(&descriptor.hash).unwrap().data.as_ref(),
            b"hello world"
        );
    }

    #[test]
    fn test_duplicate_flushes_share_hash() {
        let (storage, mut buffer) = buffer_with(64);
        buffer.write(b"same").unwrap();
        buffer.flush().unwrap();
        buffer.write(b"same").unwrap();
        buffer.flush().unwrap();

        let manifest = buffer.manifest().as_slice();
        assert_eq!(manifest[0].hash, manifest[1].hash);
        assert_eq!(storage.chunk_count(), 1);
        assert_eq!(storage.get_chunk(&manifest[0].hash).unwrap().ref_count, 2);
    }

    #[test]
    fn test_current_part_labels_descriptors() {
        let (_storage, mut buffer) = buffer_with(64);
        buffer.current_part(&MimePart::new("1", 0, 5));
        buffer.write(b"head").unwrap();
        buffer.flush().unwrap();
        buffer.current_part(&MimePart::new("1.1", 5, 9).with_header("Content-Type", "text/html"));
        buffer.write(b"body").unwrap();
        buffer.flush().unwrap();

        let manifest = buffer.manifest().as_slice();
        assert_eq!(manifest[0].part, "1");
        assert_eq!(manifest[1].part, "1.1");
        assert_eq!(manifest[1].content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_reset_and_take_manifest() {
        let (_storage, mut buffer) = buffer_with(64);
        buffer.write(b"abc").unwrap();
        buffer.flush().unwrap();
        buffer.write(b"pending").unwrap();

        let manifest = buffer.take_manifest();
        assert_eq!(manifest.total_size(), 3);
        assert!(buffer.manifest().is_empty());
        assert_eq!(buffer.buffered_len(), 0);
    }

    #[test]
    fn test_cap_zero_uses_default() {
        let mut buffer = ChunkBuffer::new();
        buffer.cap_to(0);
        assert_eq!(buffer.cap(), DEFAULT_CHUNK_MAX_BYTES);
    }
}
