//! Error types for Rosebud.

use thiserror::Error;

/// Library-level error type for Rosebud operations.
#[derive(Error, Debug)]
pub enum RosebudError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The query-construction completion could not be read as a `{query, filter}` object.
    #[error("Malformed query response: {0}")]
    MalformedQuery(String),

    /// The filter string was readable but is not a valid expression over the schema.
    #[error("Filter parse error: {0}")]
    FilterParse(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Document store unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Not yet available: {0}")]
    NotYetAvailable(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl RosebudError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RosebudError::RetrievalUnavailable(_) | RosebudError::OpenAI(_) | RosebudError::Http(_)
        )
    }
}

/// Result type alias for Rosebud operations.
pub type Result<T> = std::result::Result<T, RosebudError>;
