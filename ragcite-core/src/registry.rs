//! Process-wide model registry.
//!
//! Each distinct embedding or NLP configuration is loaded at most once and the
//! resulting handle is shared by every pipeline built from the registry.
//! Pipelines receive the handles through their constructor, so tests can
//! bypass the registry entirely and inject doubles.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::embeddings::{Embedder, EmbeddingConfig, create_embedder};
use crate::error::Result;
use crate::nlp::{NlpConfig, NlpEngine, create_nlp};

static GLOBAL: LazyLock<ModelRegistry> = LazyLock::new(ModelRegistry::new);

#[derive(Default)]
struct Loaded {
    embedders: HashMap<EmbeddingConfig, Arc<dyn Embedder>>,
    nlp: HashMap<NlpConfig, Arc<dyn NlpEngine>>,
}

/// Lazily loaded, shared model handles keyed by configuration.
#[derive(Default)]
pub struct ModelRegistry {
    loaded: Mutex<Loaded>,
}

impl ModelRegistry {
    /// An empty registry, independent of the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ModelRegistry {
        &GLOBAL
    }

    fn lock(&self) -> MutexGuard<'_, Loaded> {
        // A panic while loading leaves the maps untouched, so the data is still valid.
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Embedder for `config`, loading it on first use.
    pub fn embedder(&self, config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
        let mut loaded = self.lock();
        if let Some(embedder) = loaded.embedders.get(config) {
            return Ok(Arc::clone(embedder));
        }
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(config)?);
        debug!(
            provider = embedder.provider_name(),
            dimensions = embedder.dimensions(),
            "Loaded embedding provider"
        );
        loaded
            .embedders
            .insert(config.clone(), Arc::clone(&embedder));
        Ok(embedder)
    }

    /// NLP engine for `config`, loading it on first use.
    pub fn nlp(&self, config: &NlpConfig) -> Result<Arc<dyn NlpEngine>> {
        let mut loaded = self.lock();
        if let Some(engine) = loaded.nlp.get(config) {
            return Ok(Arc::clone(engine));
        }
        let engine: Arc<dyn NlpEngine> = Arc::from(create_nlp(config)?);
        debug!(engine = engine.name(), "Loaded NLP engine");
        loaded.nlp.insert(config.clone(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Number of loaded models of either kind.
    pub fn len(&self) -> usize {
        let loaded = self.lock();
        loaded.embedders.len() + loaded.nlp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
