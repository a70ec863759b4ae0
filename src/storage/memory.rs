//! Map-backed storage engine.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;

use super::compress::{compress, decompress};
use super::{ChunkStorage, EnvelopeInfo, MessageId, MessageRecord, MessageSummary, check_total};
use crate::chunk::{ChunkHash, Manifest, StoredChunk};
use crate::config::{BackendConfig, MAX_COMPRESS_LEVEL};
use crate::error::StorageError;

#[derive(Debug)]
struct MemoryChunk {
    payload: Vec<u8>,
    size: usize,
    ref_count: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    messages: HashMap<MessageId, MessageRecord>,
    chunks: HashMap<ChunkHash, MemoryChunk>,
}

/// An ephemeral chunk store held in process memory.
///
/// Payloads are zlib-compressed at the configured level before they are
/// kept. All state lives behind one mutex, which makes the dedup operation
/// a single critical section.
///
/// # Example
///
/// ```
/// use chunksaver::{ChunkHash, ChunkStorage, MemoryStorage};
///
/// let store = MemoryStorage::with_compress_level(6);
/// let hash = ChunkHash::new([1u8; 32]);
///
/// assert!(!store.add_chunk(&hash, b"body")?);
/// assert!(store.add_chunk(&hash, b"body")?);
/// assert_eq!(store.get_chunk(&hash)?.ref_count, 2);
/// # Ok::<(), chunksaver::StorageError>(())
/// ```
#[derive(Debug)]
pub struct MemoryStorage {
    compress_level: u32,
    next_id: AtomicU64,
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// Creates a store that keeps payloads at compression level 0.
    pub fn new() -> Self {
        Self::with_compress_level(0)
    }

    /// Creates a store compressing payloads at `level`, clamped to 0-9.
    pub fn with_compress_level(level: u32) -> Self {
        Self {
            compress_level: level.min(MAX_COMPRESS_LEVEL),
            next_id: AtomicU64::new(1),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Returns the compression level in use.
    pub fn compress_level(&self) -> u32 {
        self.compress_level
    }

    /// Number of distinct chunks held.
    pub fn chunk_count(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Number of message records held.
    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStorage for MemoryStorage {
    fn initialize(&self, _config: &BackendConfig) -> Result<(), StorageError> {
        Ok(())
    }

    fn shutdown(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn open_message(&self, info: &EnvelopeInfo) -> Result<MessageId, StorageError> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .messages
            .insert(id, MessageRecord::opened(id, info));
        Ok(id)
    }

    fn close_message(
        &self,
        id: MessageId,
        total_bytes: u64,
        manifest: &Manifest,
        summary: &MessageSummary,
    ) -> Result<(), StorageError> {
        check_total(total_bytes, manifest)?;
        let mut state = self.lock();
        let record = state
            .messages
            .get_mut(&id)
            .ok_or(StorageError::UnknownMessage(id))?;
        record.close(total_bytes, manifest, summary);
        Ok(())
    }

    fn add_chunk(&self, hash: &ChunkHash, data: &[u8]) -> Result<bool, StorageError> {
        let mut state = self.lock();
        match state.chunks.entry(*hash) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().ref_count += 1;
                trace!(%hash, refs = entry.get().ref_count, "chunk already stored");
                Ok(true)
            }
            Entry::Vacant(entry) => {
                let payload =
                    compress(data, self.compress_level).map_err(StorageError::Compression)?;
                trace!(%hash, size = data.len(), stored = payload.len(), "chunk stored");
                entry.insert(MemoryChunk {
                    payload,
                    size: data.len(),
                    ref_count: 1,
                });
                Ok(false)
            }
        }
    }

    fn get_message(&self, id: MessageId) -> Result<MessageRecord, StorageError> {
        self.lock()
            .messages
            .get(&id)
            .cloned()
            .ok_or(StorageError::UnknownMessage(id))
    }

    fn get_chunk(&self, hash: &ChunkHash) -> Result<StoredChunk, StorageError> {
        let (payload, size, ref_count) = {
            let state = self.lock();
            let chunk = state
                .chunks
                .get(hash)
                .ok_or(StorageError::UnknownChunk(*hash))?;
            (chunk.payload.clone(), chunk.size, chunk.ref_count)
        };
        let data = decompress(&payload, size).map_err(StorageError::Compression)?;
        Ok(StoredChunk {
            hash: *hash,
            data: Bytes::from(data),
            ref_count,
        })
    }
}
