//! Durable storage engine on redb.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use ::redb::{Database, ReadableTable, TableDefinition};
use bytes::Bytes;
use tracing::{debug, trace};

use super::{ChunkStorage, EnvelopeInfo, MessageId, MessageRecord, MessageSummary, check_total};
use crate::chunk::{ChunkHash, Manifest, StoredChunk};
use crate::config::BackendConfig;
use crate::error::StorageError;

const CHUNKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("chunks");
const CHUNK_REFS: TableDefinition<&[u8], u64> = TableDefinition::new("chunk_refs");
const MESSAGES: TableDefinition<u64, &str> = TableDefinition::new("messages");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const MESSAGE_SEQUENCE: &str = "message_id";

/// A chunk store persisted to a single redb file.
///
/// redb admits one write transaction at a time, so the dedup lookup and
/// the insert or increment that follows it commit atomically.
///
/// # Example
///
/// ```no_run
/// use chunksaver::{BackendConfig, ChunkStorage, RedbStorage};
///
/// let store = RedbStorage::new("/var/spool/chunks.redb");
/// store.initialize(&BackendConfig::new())?;
/// // ...
/// store.shutdown()?;
/// # Ok::<(), chunksaver::StorageError>(())
/// ```
pub struct RedbStorage {
    path: PathBuf,
    db: RwLock<Option<Database>>,
}

impl RedbStorage {
    /// Creates an engine for the file at `path`. Nothing is opened until
    /// [`ChunkStorage::initialize`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            db: RwLock::new(None),
        }
    }

    /// Returns the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(StorageError::NotInitialized)?;
        f(db)
    }
}

impl fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self
            .db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("RedbStorage")
            .field("path", &self.path)
            .field("open", &open)
            .finish()
    }
}

impl ChunkStorage for RedbStorage {
    fn initialize(&self, _config: &BackendConfig) -> Result<(), StorageError> {
        let db = Database::create(&self.path)?;
        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(CHUNK_REFS)?;
        txn.open_table(MESSAGES)?;
        txn.open_table(SEQUENCES)?;
        txn.commit()?;

        debug!(path = %self.path.display(), "redb chunk store opened");
        *self.db.write().unwrap_or_else(PoisonError::into_inner) = Some(db);
        Ok(())
    }

    fn shutdown(&self) -> Result<(), StorageError> {
        let db = self
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if db.is_some() {
            debug!(path = %self.path.display(), "redb chunk store closed");
        }
        Ok(())
    }

    fn open_message(&self, info: &EnvelopeInfo) -> Result<MessageId, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_write()?;
            let id = {
                let mut sequences = txn.open_table(SEQUENCES)?;
                let last = sequences
                    .get(MESSAGE_SEQUENCE)?
                    .map(|guard| guard.value())
                    .unwrap_or(0);
                let id = MessageId::new(last + 1);
                sequences.insert(MESSAGE_SEQUENCE, id.get())?;

                let record = serde_json::to_string(&MessageRecord::opened(id, info))?;
                txn.open_table(MESSAGES)?
                    .insert(id.get(), record.as_str())?;
                id
            };
            txn.commit()?;
            Ok(id)
        })
    }

    fn close_message(
        &self,
        id: MessageId,
        total_bytes: u64,
        manifest: &Manifest,
        summary: &MessageSummary,
    ) -> Result<(), StorageError> {
        check_total(total_bytes, manifest)?;
        self.with_db(|db| {
            let txn = db.begin_write()?;
            {
                let mut messages = txn.open_table(MESSAGES)?;
                let mut record: MessageRecord = match messages.get(id.get())? {
                    Some(guard) => serde_json::from_str(guard.value())?,
                    None => return Err(StorageError::UnknownMessage(id)),
                };
                record.close(total_bytes, manifest, summary);
                let encoded = serde_json::to_string(&record)?;
                messages.insert(id.get(), encoded.as_str())?;
            }
            txn.commit()?;
            Ok(())
        })
    }

    fn add_chunk(&self, hash: &ChunkHash, data: &[u8]) -> Result<bool, StorageError> {
        self.with_db(|db| {
            let key: &[u8] = hash.as_bytes();
            let txn = db.begin_write()?;
            let existed = {
                let mut refs = txn.open_table(CHUNK_REFS)?;
                let current = refs.get(key)?.map(|guard| guard.value());
                match current {
                    Some(count) => {
                        refs.insert(key, count + 1)?;
                        trace!(%hash, refs = count + 1, "chunk already stored");
                        true
                    }
                    None => {
                        txn.open_table(CHUNKS)?.insert(key, data)?;
                        refs.insert(key, 1)?;
                        trace!(%hash, size = data.len(), "chunk stored");
                        false
                    }
                }
            };
            txn.commit()?;
            Ok(existed)
        })
    }

    fn get_message(&self, id: MessageId) -> Result<MessageRecord, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let messages = txn.open_table(MESSAGES)?;
            let guard = messages
                .get(id.get())?
                .ok_or(StorageError::UnknownMessage(id))?;
            Ok(serde_json::from_str(guard.value())?)
        })
    }

    fn get_chunk(&self, hash: &ChunkHash) -> Result<StoredChunk, StorageError> {
        self.with_db(|db| {
            let key: &[u8] = hash.as_bytes();
            let txn = db.begin_read()?;
            let data = txn
                .open_table(CHUNKS)?
                .get(key)?
                .map(|guard| Bytes::copy_from_slice(guard.value()))
                .ok_or(StorageError::UnknownChunk(*hash))?;
            let ref_count = txn
                .open_table(CHUNK_REFS)?
                .get(key)?
                .map(|guard| guard.value())
                .unwrap_or(0);
            Ok(StoredChunk {
                hash: *hash,
                data,
                ref_count,
            })
        })
    }
}
