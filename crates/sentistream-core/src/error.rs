//! Error types for sentistream

/// Result type alias using sentistream's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for sentistream operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tokenizer or model artifacts could not be resolved or materialized
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// An input text could not be encoded
    #[error("tokenization error: {0}")]
    Tokenization(String),

    /// The forward pass or probability normalization failed
    #[error("inference error: {0}")]
    Inference(String),

    /// Model output classes and the configured label map disagree
    #[error("label map error: {0}")]
    LabelMap(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new tokenization error
    pub fn tokenization(msg: impl Into<String>) -> Self {
        Self::Tokenization(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new label map error
    pub fn label_map(msg: impl Into<String>) -> Self {
        Self::LabelMap(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short, stable name of the error kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelLoad(_) => "model_load",
            Self::Tokenization(_) => "tokenization",
            Self::Inference(_) => "inference",
            Self::LabelMap(_) => "label_map",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether the error means the analyzer (or its configuration) is unusable.
    ///
    /// Load and label-map failures are deployment bugs; callers should stop
    /// rather than skip items.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad(_) | Self::LabelMap(_) | Self::Config(_))
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Inference(_) | Self::Io(_))
    }
}
