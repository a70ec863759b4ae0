//! chunksaver
//!
//! Streaming chunk-and-dedup storage for SMTP servers.
//!
//! `chunksaver` is a stream stage that sits after a MIME analyzer in the
//! body pipeline of a mail transaction. Every byte is forwarded unchanged to
//! the next stage; on the side, the message is cut into chunks at:
//!
//! - the start of each MIME part
//! - the end of each part's header block
//! - the configured chunk size cap
//!
//! Each chunk is hashed with BLAKE3 and stored once in a content-addressed,
//! reference-counted store. A message record keeps the ordered manifest of
//! chunk hashes so the message can be read back byte for byte.
//!
//! The crate intentionally:
//! - does NOT parse SMTP or MIME itself
//! - does NOT spawn threads or run an event loop
//! - does NOT garbage-collect unreferenced chunks
//!
//! # Example
//!
//! ```
//! use chunksaver::{BackendConfig, ChunkSaver, Envelope, IoSink, MimePart, read_message};
//!
//! let mut backend = BackendConfig::new();
//! backend.insert("chunksaver_storage_engine".into(), "memory".into());
//!
//! let mut saver = ChunkSaver::builder().build();
//! saver.initialize(&backend)?;
//!
//! let message = b"Subject: hi\r\n\r\nhello";
//! let envelope = Envelope::new("a@example.com", "b@example.com").into_shared();
//! envelope.write().set_mime_parts(vec![MimePart::new("1", 0, 15)]);
//!
//! let mut splitter = saver.decorate(IoSink::new(Vec::new()))?;
//! let id = splitter.open(envelope)?;
//! splitter.write(message)?;
//! splitter.close()?;
//!
//! let storage = saver.storage().expect("initialized");
//! assert_eq!(read_message(&**storage, id)?, message);
//! # Ok::<(), chunksaver::ChunkSaverError>(())
//! ```
//!
//! # Storage engines
//!
//! - [`MemoryStorage`] - map-backed, zlib-compressed payloads, lost on exit
//! - `RedbStorage` (feature = "storage-redb") - a single redb database file

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod buffer;
mod chunk;
mod config;
mod envelope;
mod error;
mod hash;
mod mime;
mod pipeline;
mod reader;
mod splitter;
mod storage;

//
// Public surface
//

pub use address::{AddressError, normalize_address};
pub use buffer::ChunkBuffer;
pub use chunk::{ChunkDescriptor, ChunkHash, Manifest, StoredChunk};
pub use config::{BackendConfig, ChunkSaverConfig, DEFAULT_CHUNK_MAX_BYTES, StorageEngineKind};
pub use envelope::{Envelope, MESSAGE_ID_KEY, MIME_PARTS_KEY, SharedEnvelope, Value, Values};
pub use error::{ChunkSaverError, Result, StorageError};
pub use hash::ContentHasher;
pub use mime::{Headers, MimePart};
pub use pipeline::{
    BoxedProcessor, BoxedStage, ChunkSaver, ChunkSaverBuilder, Decorator, IoSink, StreamProcessor,
    StreamRegistry, StreamStage,
};
pub use reader::{MessageReader, read_message};
pub use splitter::{ChunkSplitter, SessionState};
#[cfg(feature = "storage-redb")]
pub use storage::RedbStorage;
pub use storage::{
    ChunkStorage, EnvelopeInfo, MemoryStorage, MessageId, MessageRecord, MessageSummary,
    engine_for,
};
