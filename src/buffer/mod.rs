//! Chunk accumulation.
//!
//! - [`ChunkBuffer`] - Builds one chunk at a time and records the manifest

mod chunk_buffer;

pub use chunk_buffer::ChunkBuffer;
