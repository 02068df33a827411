//! In-memory document store.
//!
//! Useful for testing and small collections.

use super::{cosine_similarity, rank, Document, DocumentStore, IndexableStore, ScoredDocument};
use crate::embedding::Embedder;
use crate::error::{Result, RosebudError};
use crate::filter::NativeFilter;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument};

struct Entry {
    document: Document,
    embedding: Vec<f32>,
}

/// In-memory document store. Search order follows insertion order.
pub struct MemoryDocumentStore {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl MemoryDocumentStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn lock_error<T>(e: std::sync::PoisonError<T>) -> RosebudError {
        RosebudError::VectorStore(format!("Failed to acquire lock: {}", e))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    #[instrument(skip(self, filter))]
    async fn search(
        &self,
        query: &str,
        filter: Option<&NativeFilter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let query_embedding = self.embedder.embed(query).await?;
        let entries = self.entries.read().map_err(Self::lock_error)?;

        let hits: Vec<ScoredDocument> = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.document.metadata.to_record())))
            .map(|e| ScoredDocument {
                document: e.document.clone(),
                score: cosine_similarity(&query_embedding, &e.embedding),
            })
            .collect();

        debug!("{} of {} documents pass the filter", hits.len(), entries.len());
        Ok(rank(hits, k))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl IndexableStore for MemoryDocumentStore {
    async fn upsert_batch(&self, docs: &[Document]) -> Result<usize> {
        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        for (document, embedding) in docs.iter().cloned().zip(embeddings) {
            match entries.iter_mut().find(|e| e.document.id == document.id) {
                Some(existing) => {
                    existing.document = document;
                    existing.embedding = embedding;
                }
                None => entries.push(Entry { document, embedding }),
            }
        }
        Ok(docs.len())
    }

    async fn document_count(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{film, KeywordEmbedder};
    use serde_json::json;

    async fn store() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new(Arc::new(KeywordEmbedder::new(&["pets", "space", "court"])));
        let mut dog = film("Dog Days", 2018, 112, &["Drama"], &["Hulu"]);
        dog.content = "Pets bring strangers together. pets".to_string();
        let mut cat = film("Cat Court", 2021, 131, &["Drama"], &[]);
        cat.content = "A courtroom drama about pets and a court case.".to_string();
        let mut moon = film("Moon Station", 2009, 97, &["Science Fiction"], &["Netflix"]);
        moon.content = "Alone in space.".to_string();
        store.upsert_batch(&[dog, cat, moon]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let store = store().await;
        let hits = store.search("pets", None, 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.title(), "Dog Days");
        assert_eq!(hits[2].document.title(), "Moon Station");
    }

    #[tokio::test]
    async fn test_search_applies_filter() {
        let store = store().await;
        let filter = NativeFilter::from_json(json!({"$and": [
            {"Genre": {"$eq": "Drama"}},
            {"Runtime (minutes)": {"$lt": 120}}
        ]}));
        let hits = store.search("pets", Some(&filter), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.title(), "Dog Days");

        let nothing = NativeFilter::from_json(json!({"Genre": {"$eq": "Western"}}));
        assert!(store.search("pets", Some(&nothing), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = store().await;
        let replacement = film("Dog Days", 2018, 112, &["Comedy"], &[]);
        store.upsert_batch(&[replacement]).await.unwrap();
        assert_eq!(store.document_count().await.unwrap(), 3);

        let filter = NativeFilter::from_json(json!({"Genre": {"$in": ["Comedy"]}}));
        let hits = store.search("anything", Some(&filter), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
