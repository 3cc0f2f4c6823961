//! # ragcite core
//!
//! Citation matching and hallucination detection for retrieval-augmented answers.
//! Provides the citation pipeline, its pluggable NLP and embedding collaborators,
//! the model registry, configuration, and fundamental types.

pub mod assemble;
pub mod cite;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod fallback;
pub mod focus;
pub mod hallucination;
pub mod locate;
pub mod nlp;
pub mod pair;
pub mod pipeline;
pub mod registry;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{CitationConfig, DEFAULT_THRESHOLD, IngestConfig, load_config};
pub use embeddings::{
    Embedder, EmbeddingConfig, LocalEmbedder, MockEmbedder, cosine_similarity, create_embedder,
};
pub use error::{CitationError, CollaboratorError, ConfigError, Result};
pub use hallucination::MANDATORY_CATEGORIES;
pub use nlp::{MockNlpEngine, NlpConfig, NlpEngine, RuleBasedNlp};
pub use pipeline::{CitationPipeline, PipelineTrace, RecordOutcome};
pub use registry::ModelRegistry;
pub use types::{
    AnswerContext, Citation, CitationReport, CitedPassage, EntityLabel, EvidenceRecord,
    FocusWord, FocusWordSet, SourcePassage, WordKind,
};
