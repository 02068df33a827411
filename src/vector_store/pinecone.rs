//! Pinecone document store over the data-plane REST API.

use super::{Document, DocumentStore, MovieMetadata, ScoredDocument};
use crate::embedding::Embedder;
use crate::error::{Result, RosebudError};
use crate::filter::NativeFilter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Metadata key holding the document text.
const TEXT_KEY: &str = "text";

/// Retry behaviour for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a NativeFilter>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct Match {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl Match {
    fn into_scored(self) -> ScoredDocument {
        let mut metadata = self.metadata.unwrap_or_default();
        let content = match metadata.remove(TEXT_KEY) {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let metadata: MovieMetadata = serde_json::from_value(Value::Object(metadata))
            .unwrap_or_else(|e| {
                warn!("Unreadable metadata on {}: {}", self.id, e);
                MovieMetadata::default()
            });
        ScoredDocument {
            document: Document {
                id: self.id,
                content,
                metadata,
            },
            score: self.score,
        }
    }
}

/// Why one attempt failed.
enum AttemptError {
    Transient(String),
    Fatal(RosebudError),
}

/// Pinecone index reached through `POST {host}/query`.
pub struct PineconeStore {
    client: reqwest::Client,
    query_url: Url,
    api_key: String,
    namespace: String,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
}

impl PineconeStore {
    /// `host` is the index host; `https://` is assumed when no scheme is given.
    pub fn new(host: &str, api_key: &str, namespace: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let query_url = Url::parse(&base)
            .and_then(|u| u.join("query"))
            .map_err(|e| RosebudError::Config(format!("Invalid Pinecone host '{}': {}", host, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RosebudError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            query_url,
            api_key: api_key.to_string(),
            namespace: namespace.to_string(),
            embedder,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn query_once(&self, body: &QueryRequest<'_>) -> std::result::Result<QueryResponse, AttemptError> {
        let response = self
            .client
            .post(self.query_url.clone())
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<QueryResponse>()
                .await
                .map_err(|e| AttemptError::Fatal(RosebudError::VectorStore(format!("Bad query response: {}", e))));
        }

        let text = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(AttemptError::Transient(format!("{}: {}", status, text)))
        } else {
            Err(AttemptError::Fatal(RosebudError::VectorStore(format!(
                "Pinecone rejected the query ({}): {}",
                status, text
            ))))
        }
    }
}

#[async_trait]
impl DocumentStore for PineconeStore {
    #[instrument(skip(self, filter), fields(namespace = %self.namespace))]
    async fn search(
        &self,
        query: &str,
        filter: Option<&NativeFilter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let vector = self.embedder.embed(query).await?;
        let body = QueryRequest {
            vector: &vector,
            top_k: k,
            include_metadata: true,
            namespace: &self.namespace,
            filter,
        };

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry.delay(attempt - 1);
                warn!("Pinecone attempt {} failed ({}), retrying in {:?}", attempt, last_error, delay);
                tokio::time::sleep(delay).await;
            }

            match self.query_once(&body).await {
                Ok(response) => {
                    debug!("Pinecone returned {} matches", response.matches.len());
                    // Pinecone already orders by score.
                    return Ok(response
                        .matches
                        .into_iter()
                        .take(k)
                        .map(Match::into_scored)
                        .collect());
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(message)) => last_error = message,
            }
        }

        Err(RosebudError::RetrievalUnavailable(format!(
            "Pinecone unreachable after {} attempts: {}",
            attempts, last_error
        )))
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}
