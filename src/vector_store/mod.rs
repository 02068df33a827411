//! Document store abstraction for Rosebud.
//!
//! Each store embeds the search string itself and applies a
//! [`NativeFilter`] before ranking.

mod memory;
mod metadata;
mod pinecone;
mod sqlite;

pub use memory::MemoryDocumentStore;
pub use metadata::MovieMetadata;
pub use pinecone::{PineconeStore, RetryPolicy};
pub use sqlite::SqliteDocumentStore;

use crate::config::{Settings, StoreProvider};
use crate::embedding::Embedder;
use crate::error::{Result, RosebudError};
use crate::filter::NativeFilter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// An indexed film: synopsis and keywords plus its metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID.
    #[serde(default = "new_document_id")]
    pub id: String,
    /// Overview and keywords, the text that is embedded.
    pub content: String,
    #[serde(default)]
    pub metadata: MovieMetadata,
}

fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: MovieMetadata) -> Self {
        Self {
            id: new_document_id(),
            content: content.into(),
            metadata,
        }
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    /// Similarity score (higher is better).
    pub score: f32,
}

/// Similarity search with an optional metadata filter.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return at most `k` documents matching `filter`, best first.
    async fn search(
        &self,
        query: &str,
        filter: Option<&NativeFilter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>>;

    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &str;
}

/// A store that can be loaded locally.
#[async_trait]
pub trait IndexableStore: DocumentStore {
    /// Embed and insert documents, replacing any with the same ID.
    async fn upsert_batch(&self, docs: &[Document]) -> Result<usize>;

    /// Get total document count.
    async fn document_count(&self) -> Result<usize>;
}

/// Open the store selected in the settings.
pub fn open_store(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match settings.vector_store.provider {
        StoreProvider::Memory => Arc::new(MemoryDocumentStore::new(embedder)),
        StoreProvider::Sqlite => Arc::new(SqliteDocumentStore::new(&settings.sqlite_path(), embedder)?),
        StoreProvider::Pinecone => {
            let host = settings.pinecone_host().ok_or_else(|| {
                RosebudError::Config(
                    "Pinecone host not set (vector_store.pinecone_host or PINECONE_INDEX_HOST)".to_string(),
                )
            })?;
            let api_key = std::env::var("PINECONE_API_KEY")
                .map_err(|_| RosebudError::Config("PINECONE_API_KEY is not set".to_string()))?;
            Arc::new(
                PineconeStore::new(&host, &api_key, &settings.vector_store.namespace, embedder)?
                    .with_retry(settings.vector_store.retry_policy()),
            )
        }
    };
    Ok(store)
}

/// Open the configured store for loading documents. Only local stores qualify.
pub fn open_indexable_store(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn IndexableStore>> {
    match settings.vector_store.provider {
        StoreProvider::Sqlite => Ok(Arc::new(SqliteDocumentStore::new(&settings.sqlite_path(), embedder)?)),
        StoreProvider::Memory => Ok(Arc::new(MemoryDocumentStore::new(embedder))),
        StoreProvider::Pinecone => Err(RosebudError::Config(
            "the Pinecone index is loaded by the ingestion job; switch vector_store.provider to sqlite to index locally"
                .to_string(),
        )),
    }
}

/// Read a JSON array of `{id?, content, metadata}` records.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)?;
    let docs: Vec<Document> = serde_json::from_str(&content)?;
    Ok(docs)
}

/// Sort by descending score, keeping store order among ties, and keep `k`.
/// A NaN score ranks last.
pub(crate) fn rank(mut hits: Vec<ScoredDocument>, k: usize) -> Vec<ScoredDocument> {
    let key = |score: f32| if score.is_nan() { f32::NEG_INFINITY } else { score };
    hits.sort_by(|a, b| key(b.score).total_cmp(&key(a.score)));
    hits.truncate(k);
    hits
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_rank_is_stable_among_ties() {
        let hit = |title: &str, score: f32| ScoredDocument {
            document: Document::new("", MovieMetadata::titled(title)),
            score,
        };
        let ranked = rank(vec![hit("A", 0.5), hit("B", 0.9), hit("C", 0.5), hit("D", 0.1)], 3);
        let titles: Vec<_> = ranked.iter().map(|h| h.document.title()).collect();
        assert_eq!(titles, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_rank_puts_nan_scores_last() {
        let hit = |title: &str, score: f32| ScoredDocument {
            document: Document::new("", MovieMetadata::titled(title)),
            score,
        };
        let ranked = rank(vec![hit("A", f32::NAN), hit("B", 0.3), hit("C", f32::NAN), hit("D", 0.8)], 4);
        let titles: Vec<_> = ranked.iter().map(|h| h.document.title()).collect();
        assert_eq!(titles, vec!["D", "B", "A", "C"]);
    }

    #[test]
    fn test_load_documents_assigns_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("films.json");
        std::fs::write(
            &path,
            r#"[{"content": "A deer and a family.", "metadata": {"Title": "The Killing of a Sacred Deer", "Genre": "Drama, Thriller"}}]"#,
        )
        .unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(!docs[0].id.is_empty());
        assert_eq!(docs[0].metadata.genre, vec!["Drama", "Thriller"]);
    }
}
