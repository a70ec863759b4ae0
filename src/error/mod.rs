//! Error types for chunksaver.
//!
//! - [`ChunkSaverError`] - Errors surfaced to the enclosing mail transaction
//! - [`StorageError`] - Failures of a [`ChunkStorage`](crate::ChunkStorage) engine

use std::io;

use crate::chunk::ChunkHash;
use crate::storage::MessageId;

/// Result type alias for chunksaver operations.
pub type Result<T, E = ChunkSaverError> = std::result::Result<T, E>;

/// Errors that can occur while chunking and storing a message stream.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSaverError {
    /// Invalid or missing configuration at startup.
    #[error("invalid config: {message}")]
    Config {
        /// Description of what was invalid.
        message: String,
    },

    /// The stream was written without envelope metadata, so the stages
    /// that run before this one never populated it.
    #[error("no message headers found")]
    MissingContext,

    /// The storage engine failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The next stage in the pipeline failed to accept bytes.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ChunkSaverError {
    /// Creates a configuration error.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Errors returned by a storage engine.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The engine was used before `initialize` or after `shutdown`.
    #[error("storage engine is not initialized")]
    NotInitialized,

    /// No message record exists for the id.
    #[error("unknown message {0}")]
    UnknownMessage(MessageId),

    /// No chunk is stored under the hash.
    #[error("unknown chunk {0}")]
    UnknownChunk(ChunkHash),

    /// The byte total passed to `close_message` disagrees with the manifest.
    #[error("recorded {recorded} bytes but manifest holds {manifest}")]
    SizeMismatch {
        /// Byte total reported by the caller.
        recorded: u64,
        /// Sum of chunk sizes in the manifest.
        manifest: u64,
    },

    /// Compressing or decompressing a chunk payload failed.
    #[error("compression error: {0}")]
    Compression(#[source] io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The redb backing store failed.
    #[cfg(feature = "storage-redb")]
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),
}

#[cfg(feature = "storage-redb")]
macro_rules! impl_from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(e: $ty) -> Self {
                    StorageError::Redb(e.into())
                }
            }
        )*
    };
}

#[cfg(feature = "storage-redb")]
impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_conversion() {
        let err: ChunkSaverError = StorageError::NotInitialized.into();
        assert!(matches!(
            err,
            ChunkSaverError::Storage(StorageError::NotInitialized)
        ));
    }

    #[test]
    fn test_display() {
        let err = StorageError::SizeMismatch {
            recorded: 100,
            manifest: 50,
        };
        assert_eq!(err.to_string(), "recorded 100 bytes but manifest holds 50");
        assert_eq!(
            ChunkSaverError::MissingContext.to_string(),
            "no message headers found"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "test");
        let err: ChunkSaverError = io_err.into();
        assert!(matches!(err, ChunkSaverError::Io(_)));
    }
}
