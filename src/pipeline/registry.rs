//! Named stream stages.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Decorator;

/// Table of stream stage decorators by name.
///
/// Built once while the server starts and handed to whatever assembles
/// the per-transaction stage chain.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chunksaver::{ChunkSaver, StreamRegistry};
///
/// let mut registry = StreamRegistry::new();
/// registry.register("chunksaver", Arc::new(ChunkSaver::builder().build()));
///
/// assert!(registry.get("chunksaver").is_some());
/// assert!(registry.get("mimeanalyzer").is_none());
/// ```
#[derive(Default, Clone)]
pub struct StreamRegistry {
    decorators: BTreeMap<String, Arc<dyn Decorator>>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decorator, returning the one it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        decorator: Arc<dyn Decorator>,
    ) -> Option<Arc<dyn Decorator>> {
        self.decorators.insert(name.into(), decorator)
    }

    /// Looks a decorator up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Decorator>> {
        self.decorators.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decorators.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, ChunkSaverConfig};
    use crate::envelope::Envelope;
    use crate::mime::MimePart;
    use crate::pipeline::{ChunkSaver, IoSink};

    #[test]
    fn test_register_replaces() {
        let mut registry = StreamRegistry::new();
        assert!(
            registry
                .register("chunksaver", Arc::new(ChunkSaver::builder().build()))
                .is_none()
        );
        assert!(
            registry
                .register("chunksaver", Arc::new(ChunkSaver::builder().build()))
                .is_some()
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), ["chunksaver"]);
    }

    #[test]
    fn test_stage_from_registry() {
        let mut saver = ChunkSaver::builder()
            .config(ChunkSaverConfig::memory())
            .build();
        saver.initialize(&BackendConfig::new()).unwrap();

        let mut registry = StreamRegistry::new();
        registry.register("chunksaver", Arc::new(saver));

        let decorator = registry.get("chunksaver").unwrap();
        let mut stage = decorator
            .decorate_stream(Box::new(IoSink::new(Vec::new())))
            .unwrap();

        let envelope = Envelope::new("a@example.com", "b@example.com").into_shared();
        envelope.write().set_mime_parts(vec![MimePart::new("1", 0, 0)]);
        stage.open(envelope.clone()).unwrap();
        assert_eq!(stage.write(b"hello").unwrap(), 5);
        stage.close().unwrap();
        assert!(envelope.read().message_id().is_some());
    }
}
