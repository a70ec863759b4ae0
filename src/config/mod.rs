//! Configuration for the chunk saver.
//!
//! The server hands every backend stage the same [`BackendConfig`] map;
//! [`ChunkSaverConfig`] picks out the keys this stage understands and
//! ignores the rest.
//!
//! | key                          | meaning                                   |
//! |------------------------------|-------------------------------------------|
//! | `chunksaver_chunk_size`      | maximum chunk size in bytes               |
//! | `chunksaver_storage_engine`  | `"memory"`, anything else is persistent   |
//! | `chunksaver_compress_level`  | zlib level 0-9 for the memory engine      |
//! | `chunksaver_database_path`   | file backing the persistent engine        |
//!
//! # Example
//!
//! ```
//! use chunksaver::{BackendConfig, ChunkSaverConfig, StorageEngineKind};
//!
//! let mut backend = BackendConfig::new();
//! backend.insert("chunksaver_storage_engine".into(), "memory".into());
//! backend.insert("chunksaver_chunk_size".into(), 0.into());
//!
//! let config = ChunkSaverConfig::from_backend_config(&backend)?;
//! assert_eq!(config.chunk_max_bytes(), 16384);
//! assert_eq!(config.storage_engine(), StorageEngineKind::Memory);
//! # Ok::<(), chunksaver::ChunkSaverError>(())
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ChunkSaverError, Result};

/// Default maximum chunk size (16 KiB).
pub const DEFAULT_CHUNK_MAX_BYTES: usize = 16 * 1024;

/// Highest zlib compression level.
pub const MAX_COMPRESS_LEVEL: u32 = 9;

/// Engine selector value for the in-memory store.
pub const MEMORY_ENGINE: &str = "memory";

/// The shared key/value configuration handed to every backend stage.
pub type BackendConfig = serde_json::Map<String, serde_json::Value>;

/// Which storage engine backs the chunk store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageEngineKind {
    /// Map-backed, ephemeral.
    Memory,
    /// Durable, file-backed.
    Persistent,
}

impl StorageEngineKind {
    /// Maps a selector string to an engine. Only `"memory"` selects the
    /// in-memory engine.
    pub fn from_selector(selector: &str) -> Self {
        if selector == MEMORY_ENGINE {
            Self::Memory
        } else {
            Self::Persistent
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(rename = "chunksaver_chunk_size")]
    chunk_size: i64,
    #[serde(rename = "chunksaver_storage_engine")]
    storage_engine: String,
    #[serde(rename = "chunksaver_compress_level")]
    compress_level: i64,
    #[serde(rename = "chunksaver_database_path")]
    database_path: Option<PathBuf>,
}

/// Settings of the chunk saver stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSaverConfig {
    chunk_max_bytes: usize,
    storage_engine: StorageEngineKind,
    compress_level: u32,
    database_path: Option<PathBuf>,
}

impl ChunkSaverConfig {
    /// Extracts and validates the chunk saver keys of a backend config.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkSaverError::Config`] if a key has the wrong type or the
    /// compression level is outside 0-9. A missing database path is only
    /// reported when the persistent engine is built.
    pub fn from_backend_config(backend: &BackendConfig) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(serde_json::Value::Object(backend.clone()))
            .map_err(|e| ChunkSaverError::config(e.to_string()))?;

        let compress_level = u32::try_from(raw.compress_level)
            .ok()
            .filter(|level| *level <= MAX_COMPRESS_LEVEL)
            .ok_or_else(|| {
                ChunkSaverError::config(format!(
                    "chunksaver_compress_level must be 0-{MAX_COMPRESS_LEVEL}, got {}",
                    raw.compress_level
                ))
            })?;

        let config = Self {
            chunk_max_bytes: usize::try_from(raw.chunk_size).unwrap_or(0),
            storage_engine: StorageEngineKind::from_selector(&raw.storage_engine),
            compress_level,
            database_path: raw.database_path,
        }
        .normalized();
        config.validate()?;
        Ok(config)
    }

    /// Creates a memory-engine configuration with default settings.
    pub fn memory() -> Self {
        Self {
            chunk_max_bytes: DEFAULT_CHUNK_MAX_BYTES,
            storage_engine: StorageEngineKind::Memory,
            compress_level: 0,
            database_path: None,
        }
    }

    /// Creates a persistent-engine configuration backed by `path`.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_engine: StorageEngineKind::Persistent,
            database_path: Some(path.into()),
            ..Self::memory()
        }
    }

    /// Sets the maximum chunk size. Zero selects the default.
    pub fn with_chunk_max_bytes(mut self, bytes: usize) -> Self {
        self.chunk_max_bytes = bytes;
        self.normalized()
    }

    /// Sets the zlib level used by the memory engine.
    pub fn with_compress_level(mut self, level: u32) -> Self {
        self.compress_level = level;
        self
    }

    /// Returns the maximum chunk size in bytes.
    pub fn chunk_max_bytes(&self) -> usize {
        self.chunk_max_bytes
    }

    /// Returns the selected engine.
    pub fn storage_engine(&self) -> StorageEngineKind {
        self.storage_engine
    }

    /// Returns the memory engine's compression level.
    pub fn compress_level(&self) -> u32 {
        self.compress_level
    }

    /// Returns the persistent engine's file, if configured.
    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    /// Checks the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkSaverError::Config`] when the compression level is out
    /// of range.
    pub fn validate(&self) -> Result<()> {
        if self.compress_level > MAX_COMPRESS_LEVEL {
            return Err(ChunkSaverError::config(format!(
                "chunksaver_compress_level must be 0-{MAX_COMPRESS_LEVEL}, got {}",
                self.compress_level
            )));
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        if self.chunk_max_bytes == 0 {
            self.chunk_max_bytes = DEFAULT_CHUNK_MAX_BYTES;
        }
        self
    }
}

impl Default for ChunkSaverConfig {
    fn default() -> Self {
        Self::memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(value: serde_json::Value) -> BackendConfig {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("test config must be an object"),
        }
    }

    #[test]
    fn test_chunk_size_defaults() {
        for size in [json!(0), json!(-5)] {
            let cfg = backend(json!({
                "chunksaver_storage_engine": "memory",
                "chunksaver_chunk_size": size,
            }));
            let config = ChunkSaverConfig::from_backend_config(&cfg).unwrap();
            assert_eq!(config.chunk_max_bytes(), DEFAULT_CHUNK_MAX_BYTES);
        }

        let cfg = backend(json!({ "chunksaver_storage_engine": "memory" }));
        let config = ChunkSaverConfig::from_backend_config(&cfg).unwrap();
        assert_eq!(config.chunk_max_bytes(), DEFAULT_CHUNK_MAX_BYTES);
    }

    #[test]
    fn test_explicit_chunk_size() {
        let cfg = backend(json!({
            "chunksaver_storage_engine": "memory",
            "chunksaver_chunk_size": 1024,
            "chunksaver_compress_level": 6,
            "save_workers_size": 3,
        }));
        let config = ChunkSaverConfig::from_backend_config(&cfg).unwrap();
        assert_eq!(config.chunk_max_bytes(), 1024);
        assert_eq!(config.compress_level(), 6);
    }

    #[test]
    fn test_persistent_is_default() {
        let config = ChunkSaverConfig::from_backend_config(&BackendConfig::new()).unwrap();
        assert_eq!(config.storage_engine(), StorageEngineKind::Persistent);
        assert_eq!(config.database_path(), None);

        let cfg = backend(json!({
            "chunksaver_storage_engine": "sql",
            "chunksaver_database_path": "/tmp/chunks.redb",
        }));
        let config = ChunkSaverConfig::from_backend_config(&cfg).unwrap();
        assert_eq!(config.storage_engine(), StorageEngineKind::Persistent);
        assert_eq!(
            config.database_path(),
            Some(Path::new("/tmp/chunks.redb"))
        );
    }

    #[test]
    fn test_bad_values() {
        let cfg = backend(json!({
            "chunksaver_storage_engine": "memory",
            "chunksaver_compress_level": 12,
        }));
        assert!(ChunkSaverConfig::from_backend_config(&cfg).is_err());

        let cfg = backend(json!({
            "chunksaver_storage_engine": "memory",
            "chunksaver_chunk_size": "big",
        }));
        assert!(ChunkSaverConfig::from_backend_config(&cfg).is_err());
    }

    #[test]
    fn test_builder() {
        let config = ChunkSaverConfig::memory()
            .with_chunk_max_bytes(0)
            .with_compress_level(3);
        assert_eq!(config.chunk_max_bytes(), DEFAULT_CHUNK_MAX_BYTES);
        assert_eq!(config.compress_level(), 3);
        assert!(config.validate().is_ok());

        assert!(
            ChunkSaverConfig::memory()
                .with_compress_level(10)
                .validate()
                .is_err()
        );
    }
}
