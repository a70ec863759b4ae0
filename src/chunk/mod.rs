//! Chunk types.
//!
//! - [`ChunkHash`] - 32-byte BLAKE3 content address
//! - [`ChunkDescriptor`] - One manifest entry (hash, size, owning MIME part)
//! - [`Manifest`] - Ordered descriptors that rebuild a message
//! - [`StoredChunk`] - A chunk as held by a storage engine

mod data;
mod descriptor;
mod hash;

pub use data::StoredChunk;
pub use descriptor::{ChunkDescriptor, Manifest};
pub use hash::ChunkHash;
