//! SQLite-based document store.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! Metadata is stored as JSON text and filtered in Rust as well.

use super::{
    cosine_similarity, rank, Document, DocumentStore, IndexableStore, MovieMetadata, ScoredDocument,
};
use crate::embedding::Embedder;
use crate::error::{Result, RosebudError};
use crate::filter::NativeFilter;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );
"#;

/// SQLite-based document store.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteDocumentStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite document store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RosebudError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, filter))]
    async fn search(
        &self,
        query: &str,
        filter: Option<&NativeFilter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let query_embedding = self.embedder.embed(query).await?;
        let conn = self.lock()?;

        let mut stmt =
            conn.prepare("SELECT id, content, metadata, embedding FROM documents ORDER BY rowid")?;

        let rows = stmt.query_map([], |row| {
            let embedding_bytes: Vec<u8> = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                Self::bytes_to_embedding(&embedding_bytes),
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, content, metadata_json, embedding) = row?;
            let metadata: MovieMetadata = match serde_json::from_str(&metadata_json) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping document {} with unreadable metadata: {}", id, e);
                    continue;
                }
            };
            if filter.is_some_and(|f| !f.matches(&metadata.to_record())) {
                continue;
            }
            hits.push(ScoredDocument {
                score: cosine_similarity(&query_embedding, &embedding),
                document: Document {
                    id,
                    content,
                    metadata,
                },
            });
        }

        debug!("Found {} matching documents", hits.len());
        Ok(rank(hits, k))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[async_trait]
impl IndexableStore for SqliteDocumentStore {
    #[instrument(skip(self, docs), fields(count = docs.len()))]
    async fn upsert_batch(&self, docs: &[Document]) -> Result<usize> {
        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != docs.len() {
            return Err(RosebudError::Embedding(format!(
                "expected {} embeddings, got {}",
                docs.len(),
                embeddings.len()
            )));
        }

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let indexed_at = Utc::now().to_rfc3339();

        for (doc, embedding) in docs.iter().zip(&embeddings) {
            let metadata = serde_json::to_string(&doc.metadata)?;
            // Upsert in place so the row keeps its original position.
            tx.execute(
                r#"
                INSERT INTO documents (id, content, metadata, embedding, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    indexed_at = excluded.indexed_at
                "#,
                params![
                    doc.id,
                    doc.content,
                    metadata,
                    Self::embedding_to_bytes(embedding),
                    indexed_at,
                ],
            )?;
        }

        tx.commit()?;
        info!("Batch upserted {} documents", docs.len());
        Ok(docs.len())
    }

    async fn document_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{film, KeywordEmbedder};
    use serde_json::json;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(KeywordEmbedder::new(&["absurd", "space"]))
    }

    #[tokio::test]
    async fn test_sqlite_document_store() {
        let store = SqliteDocumentStore::in_memory(embedder()).unwrap();

        let mut lobster = film("The Lobster", 2015, 119, &["Comedy", "Drama"], &["Netflix"]);
        lobster.content = "An absurd dystopian romance.".to_string();
        let mut solaris = film("Solaris", 1972, 167, &["Science Fiction"], &[]);
        solaris.content = "A psychologist in space.".to_string();

        assert_eq!(store.upsert_batch(&[lobster, solaris]).await.unwrap(), 2);
        assert_eq!(store.document_count().await.unwrap(), 2);

        let hits = store.search("absurd comedy", None, 10).await.unwrap();
        assert_eq!(hits[0].document.title(), "The Lobster");
        assert!((hits[0].score - 1.0).abs() < 0.001);
        assert_eq!(hits[0].document.metadata.stream, vec!["Netflix"]);

        let filter = NativeFilter::from_json(json!({"Release Year": {"$lt": 2000}}));
        let hits = store.search("absurd", Some(&filter), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.title(), "Solaris");
    }

    #[tokio::test]
    async fn test_store_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("films.db");

        {
            let store = SqliteDocumentStore::new(&path, embedder()).unwrap();
            store
                .upsert_batch(&[film("Dogtooth", 2009, 97, &["Drama"], &[])])
                .await
                .unwrap();
        }

        let reopened = SqliteDocumentStore::new(&path, embedder()).unwrap();
        assert_eq!(reopened.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = SqliteDocumentStore::in_memory(embedder()).unwrap();
        let docs = vec![
            film("First", 2001, 90, &["Drama"], &[]),
            film("Second", 2002, 90, &["Drama"], &[]),
            film("Third", 2003, 90, &["Drama"], &[]),
        ];
        store.upsert_batch(&docs).await.unwrap();

        let hits = store.search("nothing in common", None, 2).await.unwrap();
        let titles: Vec<_> = hits.iter().map(|h| h.document.title()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }
}
