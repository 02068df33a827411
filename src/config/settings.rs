//! Configuration settings for Rosebud.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub models: ModelSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub vector_store: VectorStoreSettings,
    pub feedback: FeedbackSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.rosebud".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Models bound to the completion and embedding boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model used to construct structured queries (always run at temperature 0).
    pub retriever: String,
    /// Model used to write the recommendation.
    pub summary: String,
    /// Embedding model for the search string.
    pub embedding: String,
    /// Embedding dimensions.
    pub embedding_dimensions: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            retriever: "gpt-4o-mini".to_string(),
            summary: "gpt-4o".to_string(),
            embedding: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
        }
    }
}

/// Recommendation generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Sampling temperature for the summary model.
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { temperature: 0.7 }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Maximum number of films handed to the summary model.
    pub top_k: usize,
    /// First and last release year in the indexed collection.
    pub years: [i32; 2],
    /// Query construction attempts before giving up on an unparsable response.
    pub max_query_attempts: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            years: [1950, 2024],
            max_query_attempts: 2,
        }
    }
}

/// Document store backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    /// Lives for one process only. The CLI refuses it for `index`, `ask`,
    /// `search`, `eval` and `serve`; it is meant for embedding the library.
    Memory,
    #[default]
    Sqlite,
    Pinecone,
}

impl std::str::FromStr for StoreProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreProvider::Memory),
            "sqlite" => Ok(StoreProvider::Sqlite),
            "pinecone" => Ok(StoreProvider::Pinecone),
            _ => Err(format!("Unknown vector store provider: {}", s)),
        }
    }
}

impl std::fmt::Display for StoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreProvider::Memory => write!(f, "memory"),
            StoreProvider::Sqlite => write!(f, "sqlite"),
            StoreProvider::Pinecone => write!(f, "pinecone"),
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (memory, sqlite, pinecone).
    pub provider: StoreProvider,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
    /// Pinecone index host. Falls back to `PINECONE_INDEX_HOST`.
    pub pinecone_host: Option<String>,
    /// Pinecone namespace holding the film documents.
    pub namespace: String,
    /// Attempts per search before the store is reported unavailable.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_base_ms: u64,
}

impl VectorStoreSettings {
    pub fn retry_policy(&self) -> crate::vector_store::RetryPolicy {
        crate::vector_store::RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: std::time::Duration::from_millis(self.retry_base_ms),
        }
    }
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Sqlite,
            sqlite_path: "~/.rosebud/films.db".to_string(),
            pinecone_host: None,
            namespace: "film_search_prod".to_string(),
            max_attempts: 4,
            retry_base_ms: 1000,
        }
    }
}

/// Feedback logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    pub enabled: bool,
    /// JSON lines file receiving thumbs up/down judgments.
    pub path: String,
    /// Pending records held before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.rosebud/feedback.jsonl".to_string(),
            queue_capacity: 64,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::RosebudError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would otherwise fail at request time.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::RosebudError;

        if self.retrieval.top_k == 0 {
            return Err(RosebudError::Config("retrieval.top_k must be greater than 0".to_string()));
        }
        let [first, last] = self.retrieval.years;
        if first > last {
            return Err(RosebudError::Config(format!(
                "retrieval.years is reversed: {} > {}",
                first, last
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RosebudError::Config(format!(
                "generation.temperature must be between 0 and 2, got {}",
                self.generation.temperature
            )));
        }
        if self.retrieval.max_query_attempts == 0 || self.vector_store.max_attempts == 0 {
            return Err(RosebudError::Config("attempt counts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rosebud")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Get the expanded feedback log path.
    pub fn feedback_path(&self) -> PathBuf {
        Self::expand_path(&self.feedback.path)
    }

    /// Pinecone index host from config or environment.
    pub fn pinecone_host(&self) -> Option<String> {
        self.vector_store
            .pinecone_host
            .clone()
            .or_else(|| std::env::var("PINECONE_INDEX_HOST").ok())
            .filter(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [retrieval]
            top_k = 5

            [vector_store]
            provider = "pinecone"
            "#,
        )
        .unwrap();

        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.retrieval.max_query_attempts, 2);
        assert_eq!(settings.vector_store.provider, StoreProvider::Pinecone);
        assert_eq!(settings.vector_store.namespace, "film_search_prod");
        assert_eq!(settings.models.retriever, "gpt-4o-mini");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.retrieval.top_k = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.years = [2024, 1950];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.generation.temperature = 0.2;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.generation.temperature, 0.2);
    }
}
