//! Content hashing for chunk identity.
//!
//! - [`ContentHasher`] - Incremental BLAKE3 hasher fed as chunk bytes arrive

mod blake3;

pub use self::blake3::ContentHasher;
