//! The chunk splitter stream stage.
//!
//! [`ChunkSplitter`] sits in the message stream after the MIME analyzer.
//! It passes every byte on to the next stage unchanged and, as a side
//! effect, cuts the stream into chunks at part starts, at header ends, and
//! at the chunk size cap.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chunksaver::{ChunkSplitter, Envelope, IoSink, MemoryStorage, MimePart};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let mut splitter = ChunkSplitter::new(IoSink::new(Vec::new()), storage.clone(), 16384);
//!
//! let message = b"Subject: hi\r\n\r\nhello";
//! let envelope = Envelope::new("a@example.com", "b@example.com").into_shared();
//! envelope.write().set_mime_parts(vec![MimePart::new("1", 0, 15)]);
//!
//! splitter.open(envelope)?;
//! splitter.write(message)?;
//! splitter.close()?;
//!
//! assert_eq!(splitter.get_ref().get_ref().as_slice(), message);
//! assert_eq!(storage.chunk_count(), 2);
//! # Ok::<(), chunksaver::ChunkSaverError>(())
//! ```

mod session;

pub use session::SessionState;

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use self::session::Session;
use crate::buffer::ChunkBuffer;
use crate::envelope::{MESSAGE_ID_KEY, SharedEnvelope, Value};
use crate::error::{ChunkSaverError, Result, StorageError};
use crate::mime::MimePart;
use crate::pipeline::{StreamProcessor, StreamStage};
use crate::storage::{ChunkStorage, EnvelopeInfo, MessageId};

/// Stream stage that chunks and deduplicates a message on its way through.
///
/// One splitter serves one transaction at a time. Its session state and
/// chunk buffer are never shared; only the storage engine is.
pub struct ChunkSplitter<S> {
    next: S,
    buffer: ChunkBuffer,
    storage: Arc<dyn ChunkStorage>,
    session: Session,
}

impl<S: StreamProcessor> ChunkSplitter<S> {
    /// Creates a splitter in front of `next`, cutting chunks of at most
    /// `chunk_max_bytes` (zero selects the default).
    pub fn new(next: S, storage: Arc<dyn ChunkStorage>, chunk_max_bytes: usize) -> Self {
        let mut buffer = ChunkBuffer::new();
        buffer.cap_to(chunk_max_bytes);
        Self::with_buffer(next, storage, buffer)
    }

    /// Creates a splitter around a caller-supplied buffer. The buffer's
    /// cap is kept; its storage is replaced with `storage`.
    pub fn with_buffer(next: S, storage: Arc<dyn ChunkStorage>, mut buffer: ChunkBuffer) -> Self {
        buffer.set_storage(storage.clone());
        Self {
            next,
            buffer,
            storage,
            session: Session::default(),
        }
    }

    /// Opens a message record for the envelope and publishes its id in the
    /// envelope metadata under [`MESSAGE_ID_KEY`].
    ///
    /// A remote IP that fails to parse is recorded as absent.
    ///
    /// # Errors
    ///
    /// Returns the storage engine's error. The session stays idle, so
    /// later writes fail with [`ChunkSaverError::MissingContext`].
    pub fn open(&mut self, envelope: SharedEnvelope) -> Result<MessageId> {
        self.session = Session::default();
        self.buffer.reset();

        let info = {
            let env = envelope.read();
            let remote_ip = env.remote_ip.parse::<IpAddr>().ok();
            if remote_ip.is_none() && !env.remote_ip.is_empty() {
                warn!(remote_ip = %env.remote_ip, "remote ip did not parse");
            }
            EnvelopeInfo {
                from: env.mail_from.clone(),
                helo: env.helo.clone(),
                to: env.first_recipient().to_owned(),
                remote_ip,
                mail_from: env.mail_from.clone(),
                tls: env.tls,
            }
        };
        let id = self.storage.open_message(&info)?;

        match envelope.write().values.as_mut() {
            Some(values) => {
                values.insert(MESSAGE_ID_KEY.to_string(), Value::MessageId(id));
            }
            None => warn!(message_id = %id, "envelope has no metadata map"),
        }
        debug!(message_id = %id, from = %info.mail_from, to = %info.to, "message opened");

        self.session = Session::opened(envelope, id);
        Ok(id)
    }

    /// Chunks `p` according to the envelope's MIME parts, then forwards it
    /// unchanged to the next stage.
    ///
    /// Without a MIME part list the bytes only pass through.
    ///
    /// # Errors
    ///
    /// - [`ChunkSaverError::MissingContext`] if no message is open or the
    ///   envelope carries no metadata
    /// - [`ChunkSaverError::Storage`] if a chunk could not be stored
    /// - whatever the next stage returns
    pub fn write(&mut self, p: &[u8]) -> Result<usize> {
        let envelope = self
            .session
            .envelope
            .clone()
            .ok_or(ChunkSaverError::MissingContext)?;
        {
            let env = envelope.read();
            if env.values.as_ref().is_none_or(|values| values.is_empty()) {
                return Err(ChunkSaverError::MissingContext);
            }
            if let Some(parts) = env.mime_parts().filter(|parts| !parts.is_empty()) {
                self.chunk_input(p, parts)?;
            }
        }
        self.session.position += p.len() as u64;
        self.session.state = SessionState::Streaming;
        self.next.write(p)
    }

    /// Flushes the last chunk and finalizes the message record.
    ///
    /// The buffer and session are reset whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush or of `close_message`. Chunks
    /// flushed earlier stay stored and the record stays open.
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.buffer.flush();
        let manifest = self.buffer.take_manifest();
        let session = std::mem::take(&mut self.session);

        if let Err(e) = flushed {
            warn!(message_id = ?session.message_id, error = %e, "final flush failed, message left open");
            return Err(e.into());
        }

        if let Some(id) = session.message_id {
            let queue_id = session
                .envelope
                .as_ref()
                .map(|envelope| envelope.read().queued_id.clone())
                .unwrap_or_default();
            self.storage.close_message(
                id,
                session.written,
                &manifest,
                &session.summary(queue_id),
            )?;
            debug!(
                message_id = %id,
                bytes = session.written,
                chunks = manifest.len(),
                "message closed"
            );
        }
        self.session.state = SessionState::Closed;
        Ok(())
    }

    /// Returns the id of the open message, if any.
    pub fn message_id(&self) -> Option<MessageId> {
        self.session.message_id
    }

    /// Returns the lifecycle state of the current session.
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Bytes chunked for the open message so far.
    pub fn written(&self) -> u64 {
        self.session.written
    }

    /// Returns the next stage.
    pub fn get_ref(&self) -> &S {
        &self.next
    }

    /// Consumes the splitter and returns the next stage.
    pub fn into_inner(self) -> S {
        self.next
    }

    fn chunk_input(&mut self, p: &[u8], parts: &[MimePart]) -> Result<(), StorageError> {
        self.session.capture_headers(&parts[0]);
        if !self.session.part_selected {
            self.buffer.current_part(&parts[0]);
            self.session.part_selected = true;
        }

        let base = self.session.position;
        let end = base + p.len() as u64;
        let last = parts.len() - 1;
        let mut pos = base;

        for (i, part) in parts.iter().enumerate().skip(self.session.progress.min(last)) {
            // a new part starts, possibly right at the first byte of `p`
            if part.starting_pos > 0 && part.starting_pos >= pos {
                pos = self.buffer_until(p, base, pos, part.starting_pos)?;
                if pos == part.starting_pos {
                    self.buffer.flush()?;
                    self.buffer.current_part(part);
                    trace!(node = %part.node, pos, "cut at part start");
                }
            }
            // the header block ends
            if part.starting_pos_body > 0 && part.starting_pos_body >= pos {
                pos = self.buffer_until(p, base, pos, part.starting_pos_body)?;
                if pos == part.starting_pos_body {
                    self.buffer.flush()?;
                    self.buffer.current_part(part);
                    trace!(node = %part.node, pos, "cut at header end");
                }
            }
            if i == last && pos < end {
                pos = self.buffer_until(p, base, pos, end)?;
            }
            if pos >= end {
                break;
            }
        }

        self.session.settle(parts, pos);
        Ok(())
    }

    /// Buffers the bytes of `p` from stream offset `from` up to `target`,
    /// or up to the end of `p` if `target` lies beyond it. Returns the
    /// offset reached.
    fn buffer_until(
        &mut self,
        p: &[u8],
        base: u64,
        from: u64,
        target: u64,
    ) -> Result<u64, StorageError> {
        let to = target.min(base + p.len() as u64);
        let slice = &p[(from - base) as usize..(to - base) as usize];
        match self.buffer.write(slice) {
            Ok(count) => {
                self.session.written += count as u64;
                Ok(to)
            }
            Err(e) => {
                // part of the slice may already sit in flushed chunks
                self.session.written =
                    self.buffer.manifest().total_size() + self.buffer.buffered_len() as u64;
                Err(e)
            }
        }
    }
}

impl<S: StreamProcessor> StreamProcessor for ChunkSplitter<S> {
    fn write(&mut self, p: &[u8]) -> Result<usize> {
        ChunkSplitter::write(self, p)
    }
}

impl<S: StreamProcessor> StreamStage for ChunkSplitter<S> {
    fn open(&mut self, envelope: SharedEnvelope) -> Result<()> {
        ChunkSplitter::open(self, envelope).map(|_| ())
    }

    fn close(&mut self) -> Result<()> {
        ChunkSplitter::close(self)
    }
}

impl<S> std::fmt::Debug for ChunkSplitter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkSplitter")
            .field("buffer", &self.buffer)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
