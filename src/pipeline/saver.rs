//! Lifecycle owner of the chunk saver stage.

use std::sync::Arc;

use tracing::info;

use super::{BoxedProcessor, BoxedStage, Decorator, StreamProcessor};
use crate::buffer::ChunkBuffer;
use crate::config::{BackendConfig, ChunkSaverConfig};
use crate::error::{ChunkSaverError, Result};
use crate::splitter::ChunkSplitter;
use crate::storage::{ChunkStorage, engine_for};

/// Owns the configuration and the shared storage engine, and builds one
/// [`ChunkSplitter`] per transaction.
///
/// # Example
///
/// ```
/// use chunksaver::{BackendConfig, ChunkSaver, IoSink};
///
/// let mut backend = BackendConfig::new();
/// backend.insert("chunksaver_storage_engine".into(), "memory".into());
///
/// let mut saver = ChunkSaver::builder().build();
/// saver.initialize(&backend)?;
///
/// let splitter = saver.decorate(IoSink::new(Vec::new()))?;
/// # drop(splitter);
/// saver.shutdown()?;
/// # Ok::<(), chunksaver::ChunkSaverError>(())
/// ```
#[derive(Default)]
pub struct ChunkSaver {
    config: Option<ChunkSaverConfig>,
    storage: Option<Arc<dyn ChunkStorage>>,
}

/// Optional overrides for a [`ChunkSaver`].
#[derive(Default)]
pub struct ChunkSaverBuilder {
    config: Option<ChunkSaverConfig>,
    storage: Option<Arc<dyn ChunkStorage>>,
}

impl ChunkSaverBuilder {
    /// Uses `storage` instead of the engine named by the configuration.
    pub fn storage(mut self, storage: Arc<dyn ChunkStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Uses `config` instead of parsing the backend configuration.
    pub fn config(mut self, config: ChunkSaverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds an uninitialized saver.
    pub fn build(self) -> ChunkSaver {
        ChunkSaver {
            config: self.config,
            storage: self.storage,
        }
    }
}

impl ChunkSaver {
    /// Starts building a saver.
    pub fn builder() -> ChunkSaverBuilder {
        ChunkSaverBuilder::default()
    }

    /// Resolves configuration, selects the storage engine unless one was
    /// injected, and initializes it. Called once at startup.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkSaverError::Config`] for invalid settings and
    /// [`ChunkSaverError::Storage`] if the engine fails to start.
    pub fn initialize(&mut self, backend: &BackendConfig) -> Result<()> {
        let config = match self.config.take() {
            Some(config) => config,
            None => ChunkSaverConfig::from_backend_config(backend)?,
        };
        config.validate()?;

        let storage = match &self.storage {
            Some(storage) => storage.clone(),
            None => engine_for(&config)?,
        };
        storage.initialize(backend)?;

        info!(
            engine = ?config.storage_engine(),
            chunk_max_bytes = config.chunk_max_bytes(),
            "chunk saver initialized"
        );
        self.config = Some(config);
        self.storage = Some(storage);
        Ok(())
    }

    /// Shuts the storage engine down. Called once at teardown.
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.shutdown()?;
            info!("chunk saver shut down");
        }
        Ok(())
    }

    /// Builds a splitter in front of `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkSaverError::Config`] before [`initialize`](Self::initialize).
    pub fn decorate<S: StreamProcessor>(&self, next: S) -> Result<ChunkSplitter<S>> {
        let (config, storage) = self.ready()?;
        Ok(ChunkSplitter::new(
            next,
            storage.clone(),
            config.chunk_max_bytes(),
        ))
    }

    /// Builds a splitter around a caller-supplied buffer, capped to the
    /// configured chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkSaverError::Config`] before [`initialize`](Self::initialize).
    pub fn decorate_with_buffer<S: StreamProcessor>(
        &self,
        next: S,
        mut buffer: ChunkBuffer,
    ) -> Result<ChunkSplitter<S>> {
        let (config, storage) = self.ready()?;
        buffer.cap_to(config.chunk_max_bytes());
        Ok(ChunkSplitter::with_buffer(next, storage.clone(), buffer))
    }

    /// Returns the resolved configuration once initialized.
    pub fn config(&self) -> Option<&ChunkSaverConfig> {
        self.config.as_ref()
    }

    /// Returns the storage engine once initialized or injected.
    pub fn storage(&self) -> Option<&Arc<dyn ChunkStorage>> {
        self.storage.as_ref()
    }

    fn ready(&self) -> Result<(&ChunkSaverConfig, &Arc<dyn ChunkStorage>)> {
        match (&self.config, &self.storage) {
            (Some(config), Some(storage)) => Ok((config, storage)),
            _ => Err(ChunkSaverError::config(
                "chunk saver used before initialize",
            )),
        }
    }
}

impl Decorator for ChunkSaver {
    fn decorate_stream(&self, next: BoxedProcessor) -> Result<BoxedStage> {
        Ok(Box::new(self.decorate(next)?))
    }
}

impl std::fmt::Debug for ChunkSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkSaver")
            .field("config", &self.config)
            .field("initialized", &self.storage.is_some())
            .finish()
    }
}
