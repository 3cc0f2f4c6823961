//! Error types for the ragcite core library.
//!
//! Uses `thiserror` for public API error types. The pipeline surfaces exactly
//! two failure kinds to callers: invalid input, detected before any model call,
//! and collaborator failures, propagated unchanged from the NLP engine or the
//! embedding provider. Configuration errors only arise while building a pipeline.

/// Top-level error type for the ragcite core library.
#[derive(Debug, thiserror::Error)]
pub enum CitationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CitationError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error was raised by validation rather than by a model call.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Errors raised by the external NLP engine or embedding provider.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("NLP engine '{engine}' failed: {message}")]
    Nlp { engine: String, message: String },

    #[error("Embedding provider '{provider}' failed: {message}")]
    Embedding { provider: String, message: String },

    #[error("Model unavailable: {model}")]
    Unavailable { model: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl CollaboratorError {
    pub fn nlp(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Nlp {
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Environment variable not set: {var}")]
    MissingEnv { var: String },
}

/// Convenience result type for ragcite operations.
pub type Result<T> = std::result::Result<T, CitationError>;
