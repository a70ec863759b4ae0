//! Stream stage plumbing.
//!
//! A mail transaction's body flows through a chain of stages. Each stage
//! is a [`StreamProcessor`] wrapping the next one; stages that need to see
//! the envelope also implement [`StreamStage`].
//!
//! - [`IoSink`] - Adapts any [`std::io::Write`] as the final stage
//! - [`ChunkSaver`] - Lifecycle owner that builds chunk splitter stages
//! - [`StreamRegistry`] - Name to [`Decorator`] table built at startup

mod registry;
mod saver;

pub use registry::StreamRegistry;
pub use saver::{ChunkSaver, ChunkSaverBuilder};

use std::io;

use crate::envelope::SharedEnvelope;
use crate::error::Result;

/// A stage that accepts message bytes.
pub trait StreamProcessor {
    /// Consumes `p`, returning how many bytes were accepted.
    fn write(&mut self, p: &[u8]) -> Result<usize>;
}

impl<T: StreamProcessor + ?Sized> StreamProcessor for Box<T> {
    fn write(&mut self, p: &[u8]) -> Result<usize> {
        (**self).write(p)
    }
}

impl<T: StreamProcessor + ?Sized> StreamProcessor for &mut T {
    fn write(&mut self, p: &[u8]) -> Result<usize> {
        (**self).write(p)
    }
}

/// A stage with a per-transaction lifecycle.
pub trait StreamStage: StreamProcessor {
    /// Starts a transaction.
    fn open(&mut self, envelope: SharedEnvelope) -> Result<()>;

    /// Ends the transaction.
    fn close(&mut self) -> Result<()>;
}

/// Boxed next stage handed to a [`Decorator`].
pub type BoxedProcessor = Box<dyn StreamProcessor + Send>;

/// Boxed stage returned by a [`Decorator`].
pub type BoxedStage = Box<dyn StreamStage + Send>;

/// Builds a stage in front of the next one.
pub trait Decorator: Send + Sync {
    /// Wraps `next` in a new stage for one transaction.
    fn decorate_stream(&self, next: BoxedProcessor) -> Result<BoxedStage>;
}

/// Final stage writing into an [`io::Write`].
#[derive(Debug, Default)]
pub struct IoSink<W>(W);

impl<W> IoSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self(writer)
    }

    /// Returns the writer.
    pub fn get_ref(&self) -> &W {
        &self.0
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: io::Write> StreamProcessor for IoSink<W> {
    fn write(&mut self, p: &[u8]) -> Result<usize> {
        self.0.write_all(p)?;
        Ok(p.len())
    }
}
