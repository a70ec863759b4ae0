//! Content-addressed, reference-counted chunk storage.
//!
//! [`ChunkStorage`] is the capability set every engine provides:
//!
//! - [`MemoryStorage`] - map-backed, optional zlib compression of payloads
//! - [`RedbStorage`] - durable store on redb (feature `storage-redb`)
//!
//! Engines are shared between all in-flight transactions, so every method
//! takes `&self` and the engine synchronizes internally. The dedup path,
//! [`ChunkStorage::add_chunk`], is an atomic check-and-increment-or-insert.

mod compress;
mod memory;
#[cfg(feature = "storage-redb")]
mod redb;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkHash, Manifest, StoredChunk};
use crate::config::{BackendConfig, ChunkSaverConfig, StorageEngineKind};
use crate::error::{ChunkSaverError, StorageError};

pub use memory::MemoryStorage;
#[cfg(feature = "storage-redb")]
pub use self::redb::RedbStorage;

/// Opaque id of a message record. Never reused by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wraps a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope fields captured when a message record is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeInfo {
    /// Sender as reported by the envelope.
    pub from: String,
    /// `HELO`/`EHLO` argument.
    pub helo: String,
    /// First recipient.
    pub to: String,
    /// Remote peer, if it parsed as an IP address.
    pub remote_ip: Option<IpAddr>,
    /// `MAIL FROM` reverse path.
    pub mail_from: String,
    /// Whether TLS was active.
    pub tls: bool,
}

/// Header-derived fields recorded when a message record is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSummary {
    /// `Subject` of the first part.
    pub subject: String,
    /// Server queue id.
    pub queue_id: String,
    /// Normalized `To` of the first part.
    pub to: String,
    /// Normalized `From` of the first part.
    pub from: String,
}

/// A stored message: envelope, manifest and summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Record id.
    pub id: MessageId,
    /// Sender as reported by the envelope.
    pub from: String,
    /// `HELO`/`EHLO` argument.
    pub helo: String,
    /// First recipient.
    pub to: String,
    /// Remote peer address.
    pub remote_ip: Option<IpAddr>,
    /// `MAIL FROM` reverse path.
    pub mail_from: String,
    /// Whether TLS was active.
    pub tls: bool,
    /// Set once `close_message` succeeded.
    pub closed: bool,
    /// Bytes chunked for this message.
    pub total_bytes: u64,
    /// Chunks in stream order.
    pub manifest: Manifest,
    /// `Subject` header.
    pub subject: String,
    /// Server queue id.
    pub queue_id: String,
    /// Normalized `To` header.
    pub header_to: String,
    /// Normalized `From` header.
    pub header_from: String,
}

impl MessageRecord {
    /// Creates an open record.
    pub fn opened(id: MessageId, info: &EnvelopeInfo) -> Self {
        Self {
            id,
            from: info.from.clone(),
            helo: info.helo.clone(),
            to: info.to.clone(),
            remote_ip: info.remote_ip,
            mail_from: info.mail_from.clone(),
            tls: info.tls,
            closed: false,
            total_bytes: 0,
            manifest: Manifest::new(),
            subject: String::new(),
            queue_id: String::new(),
            header_to: String::new(),
            header_from: String::new(),
        }
    }

    /// Finalizes the record.
    pub fn close(&mut self, total_bytes: u64, manifest: &Manifest, summary: &MessageSummary) {
        self.closed = true;
        self.total_bytes = total_bytes;
        self.manifest = manifest.clone();
        self.subject = summary.subject.clone();
        self.queue_id = summary.queue_id.clone();
        self.header_to = summary.to.clone();
        self.header_from = summary.from.clone();
    }
}

/// Capability set of a chunk storage engine.
pub trait ChunkStorage: Send + Sync {
    /// Prepares the engine. Called once at startup.
    fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError>;

    /// Releases the engine. Called once at teardown.
    fn shutdown(&self) -> Result<(), StorageError>;

    /// Creates a message record and returns its fresh id.
    fn open_message(&self, info: &EnvelopeInfo) -> Result<MessageId, StorageError>;

    /// Finalizes a message record with its manifest.
    ///
    /// `total_bytes` must equal [`Manifest::total_size`]; engines reject a
    /// mismatch with [`StorageError::SizeMismatch`].
    fn close_message(
        &self,
        id: MessageId,
        total_bytes: u64,
        manifest: &Manifest,
        summary: &MessageSummary,
    ) -> Result<(), StorageError>;

    /// Stores a chunk once per distinct hash.
    ///
    /// Returns `true` if the chunk already existed, in which case only its
    /// reference count was incremented.
    fn add_chunk(&self, hash: &ChunkHash, data: &[u8]) -> Result<bool, StorageError>;

    /// Loads a message record.
    fn get_message(&self, id: MessageId) -> Result<MessageRecord, StorageError>;

    /// Loads a chunk with its reference count.
    fn get_chunk(&self, hash: &ChunkHash) -> Result<StoredChunk, StorageError>;
}

/// Rejects a byte total that disagrees with the manifest.
pub(crate) fn check_total(total_bytes: u64, manifest: &Manifest) -> Result<(), StorageError> {
    let manifest_bytes = manifest.total_size();
    if total_bytes != manifest_bytes {
        return Err(StorageError::SizeMismatch {
            recorded: total_bytes,
            manifest: manifest_bytes,
        });
    }
    Ok(())
}

/// Builds the engine selected by a configuration.
///
/// # Errors
///
/// Returns [`ChunkSaverError::Config`] if the persistent engine is selected
/// without a database path, or the crate was built without it.
pub fn engine_for(config: &ChunkSaverConfig) -> Result<Arc<dyn ChunkStorage>, ChunkSaverError> {
    match config.storage_engine() {
        StorageEngineKind::Memory => Ok(Arc::new(MemoryStorage::with_compress_level(
            config.compress_level(),
        ))),
        #[cfg(feature = "storage-redb")]
        StorageEngineKind::Persistent => {
            let path = config.database_path().ok_or_else(|| {
                ChunkSaverError::config("chunksaver_database_path is required for the persistent engine")
            })?;
            Ok(Arc::new(RedbStorage::new(path)))
        }
        #[cfg(not(feature = "storage-redb"))]
        StorageEngineKind::Persistent => Err(ChunkSaverError::config(
            "persistent engine requires the storage-redb feature",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkDescriptor;

    #[test]
    fn test_check_total() {
        let mut manifest = Manifest::new();
        manifest.push(ChunkDescriptor {
            hash: ChunkHash::new([1; 32]),
            size: 7,
            part: "1".into(),
            content_type: None,
        });
        assert!(check_total(7, &manifest).is_ok());
        assert!(matches!(
            check_total(8, &manifest),
            Err(StorageError::SizeMismatch {
                recorded: 8,
                manifest: 7
            })
        ));
    }

    #[test]
    fn test_engine_for_memory() {
        let engine = engine_for(&ChunkSaverConfig::memory()).unwrap();
        engine.initialize(&BackendConfig::new()).unwrap();
        let id = engine.open_message(&EnvelopeInfo::default()).unwrap();
        assert!(engine.get_message(id).is_ok());
    }

    #[test]
    fn test_record_close() {
        let info = EnvelopeInfo {
            from: "a@example.com".into(),
            tls: true,
            ..EnvelopeInfo::default()
        };
        let mut record = MessageRecord::opened(MessageId::new(4), &info);
        assert!(!record.closed);

        let summary = MessageSummary {
            subject: "hi".into(),
            ..MessageSummary::default()
        };
        record.close(0, &Manifest::new(), &summary);
        assert!(record.closed);
        assert_eq!(record.subject, "hi");
        assert!(record.tls);
    }
}
