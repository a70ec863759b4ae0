//! Reassembly of stored messages.
//!
//! [`MessageReader`] walks a manifest and fetches one chunk at a time, so a
//! large message never has to be held in memory whole. [`read_message`] is
//! the convenience form that collects everything into a `Vec`.

use std::io::{self, Read};

use bytes::{Buf, Bytes};

use crate::chunk::Manifest;
use crate::error::StorageError;
use crate::storage::{ChunkStorage, MessageId};

/// Reads a stored message back as a byte stream.
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use std::sync::Arc;
/// use chunksaver::{ChunkSplitter, Envelope, IoSink, MemoryStorage, MessageReader, MimePart};
///
/// let storage = Arc::new(MemoryStorage::new());
/// let mut splitter = ChunkSplitter::new(IoSink::new(Vec::new()), storage.clone(), 8);
///
/// let envelope = Envelope::new("a@example.com", "b@example.com").into_shared();
/// envelope.write().set_mime_parts(vec![MimePart::new("1", 0, 0)]);
/// let id = splitter.open(envelope)?;
/// splitter.write(b"a message body")?;
/// splitter.close()?;
///
/// let mut out = String::new();
/// MessageReader::open(&*storage, id)?.read_to_string(&mut out)?;
/// assert_eq!(out, "a message body");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MessageReader<'a> {
    storage: &'a dyn ChunkStorage,
    manifest: Manifest,
    next: usize,
    current: Bytes,
}

impl<'a> MessageReader<'a> {
    /// Looks up the message record and prepares to read its chunks.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownMessage`] if no record has this id.
    pub fn open(storage: &'a dyn ChunkStorage, id: MessageId) -> Result<Self, StorageError> {
        let record = storage.get_message(id)?;
        Ok(Self::from_manifest(storage, record.manifest))
    }

    /// Reads the chunks listed in `manifest`.
    pub fn from_manifest(storage: &'a dyn ChunkStorage, manifest: Manifest) -> Self {
        Self {
            storage,
            manifest,
            next: 0,
            current: Bytes::new(),
        }
    }

    /// Bytes the manifest says the message holds.
    pub fn total_size(&self) -> u64 {
        self.manifest.total_size()
    }

    fn load_next(&mut self) -> Result<bool, StorageError> {
        let Some(descriptor) = self.manifest.as_slice().get(self.next) else {
            return Ok(false);
        };
        let chunk = self.storage.get_chunk(&descriptor.hash)?;
        if chunk.len() as u64 != descriptor.size {
            return Err(StorageError::SizeMismatch {
                recorded: chunk.len() as u64,
                manifest: descriptor.size,
            });
        }
        self.next += 1;
        self.current = chunk.into_data();
        Ok(true)
    }
}

impl Read for MessageReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.current.has_remaining() {
            if !self.load_next().map_err(io::Error::other)? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl std::fmt::Debug for MessageReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReader")
            .field("chunks", &self.manifest.len())
            .field("next", &self.next)
            .field("buffered", &self.current.len())
            .finish()
    }
}

/// Reassembles a stored message into memory.
///
/// # Errors
///
/// Returns [`StorageError::UnknownMessage`] or [`StorageError::UnknownChunk`]
/// when the record or one of its chunks is missing.
pub fn read_message(storage: &dyn ChunkStorage, id: MessageId) -> Result<Vec<u8>, StorageError> {
    let record = storage.get_message(id)?;
    let mut out = Vec::with_capacity(usize::try_from(record.total_bytes).unwrap_or(0));
    for descriptor in &record.manifest {
        let chunk = storage.get_chunk(&descriptor.hash)?;
        out.extend_from_slice(&chunk.data);
    }
    Ok(out)
}
