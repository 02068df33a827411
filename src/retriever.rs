//! Self-querying retrieval: construct a structured query, translate its
//! filter, and search the document store.

use crate::error::{Result, RosebudError};
use crate::filter::FilterTranslator;
use crate::query::{QueryConstructor, StructuredQuery};
use crate::vector_store::{rank, DocumentStore, ScoredDocument};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Ranked documents for one request, with the query that selected them.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub query: StructuredQuery,
    pub documents: Vec<ScoredDocument>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Query construction followed by filtered search.
///
/// The two steps are exposed separately so callers can observe the
/// structured query before documents arrive.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn construct(&self, query: &str) -> Result<StructuredQuery>;

    async fn search(&self, query: &StructuredQuery, k: usize) -> Result<Vec<ScoredDocument>>;

    /// The translator `search` uses to build native filters.
    fn translator(&self) -> &FilterTranslator;

    async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let structured = self.construct(query).await?;
        let documents = self.search(&structured, k).await?;
        Ok(RetrievalResult {
            query: structured,
            documents,
        })
    }
}

pub struct SelfQueryRetriever {
    constructor: Arc<dyn QueryConstructor>,
    translator: FilterTranslator,
    store: Arc<dyn DocumentStore>,
}

impl SelfQueryRetriever {
    pub fn new(
        constructor: Arc<dyn QueryConstructor>,
        translator: FilterTranslator,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            constructor,
            translator,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

#[async_trait]
impl Retriever for SelfQueryRetriever {
    async fn construct(&self, query: &str) -> Result<StructuredQuery> {
        self.constructor.construct(query).await
    }

    fn translator(&self) -> &FilterTranslator {
        &self.translator
    }

    #[instrument(skip(self), fields(store = self.store.name()))]
    async fn search(&self, query: &StructuredQuery, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Err(RosebudError::InvalidInput("k must be greater than 0".to_string()));
        }

        let filter = self.translator.translate_query(query)?;
        let documents = rank(self.store.search(&query.query, filter.as_ref(), k).await?, k);

        info!("Retrieved {} documents", documents.len());
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::query::{Comparator, ConstructorConfig, FilterExpression, LlmQueryConstructor, Value};
    use crate::testing::{film, hit, RecordingStore, ScriptedCompletion};
    use serde_json::json;

    fn retriever(reply: &str, store: Arc<RecordingStore>) -> SelfQueryRetriever {
        let constructor = LlmQueryConstructor::new(
            Arc::new(ScriptedCompletion::always(reply)),
            ConstructorConfig::movies(1950, 2024),
            Prompts::default(),
        );
        SelfQueryRetriever::new(Arc::new(constructor), FilterTranslator::pinecone(), store)
    }

    #[tokio::test]
    async fn test_no_filter_searches_unfiltered() {
        let store = Arc::new(RecordingStore::with_hits(vec![hit(
            film("The Lobster", 2015, 119, &["Comedy"], &[]),
            0.8,
        )]));
        let r = retriever(
            r#"{"query": "Dark comedy, absurd, Greek Weird Wave", "filter": "NO_FILTER"}"#,
            store.clone(),
        );

        let result = r.retrieve("Films similar to Yorgos Lanthimos movies.", 5).await.unwrap();
        assert_eq!(result.query.filter, None);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(*store.filters.lock().unwrap(), vec![None]);
        assert_eq!(
            *store.queries.lock().unwrap(),
            vec!["Dark comedy, absurd, Greek Weird Wave".to_string()]
        );
    }

    #[tokio::test]
    async fn test_filter_is_translated_for_the_store() {
        let store = Arc::new(RecordingStore::empty());
        let r = retriever(
            r#"{"query": "pets", "filter": "and(eq(\"Genre\", \"Drama\"), eq(\"Language\", \"English\"), lt(\"Runtime (minutes)\", 120))"}"#,
            store.clone(),
        );

        let result = r
            .retrieve(
                "Find me drama movies in English that are less than 2 hours long and feature pets.",
                5,
            )
            .await
            .unwrap();

        assert_eq!(result.query.query, "pets");
        assert_eq!(
            result.query.filter,
            Some(FilterExpression::and(vec![
                FilterExpression::comparison(Comparator::Eq, "Genre", Value::String("Drama".into())),
                FilterExpression::comparison(Comparator::Eq, "Language", Value::String("English".into())),
                FilterExpression::comparison(Comparator::Lt, "Runtime (minutes)", Value::Integer(120)),
            ]))
        );
        // Nothing matched: an empty result, not an error.
        assert!(result.is_empty());

        let filters = store.filters.lock().unwrap();
        assert_eq!(
            filters[0].as_ref().unwrap().as_json(),
            &json!({"$and": [
                {"Genre": {"$eq": "Drama"}},
                {"Language": {"$eq": "English"}},
                {"Runtime (minutes)": {"$lt": 120}}
            ]})
        );
    }

    #[tokio::test]
    async fn test_results_are_ranked_and_bounded() {
        let store = Arc::new(RecordingStore::with_hits(vec![
            hit(film("A", 2000, 90, &["Drama"], &[]), 0.2),
            hit(film("B", 2000, 90, &["Drama"], &[]), 0.9),
            hit(film("C", 2000, 90, &["Drama"], &[]), 0.2),
        ]));
        let r = retriever(r#"{"query": "x", "filter": "NO_FILTER"}"#, store);

        let docs = r.search(&StructuredQuery::new("x", None), 3).await.unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d.document.title()).collect();
        assert_eq!(titles, vec!["B", "A", "C"]);

        let docs = r.search(&StructuredQuery::new("x", None), 1).await.unwrap();
        assert_eq!(docs.len(), 1);
        tokio_test::assert_err!(r.search(&StructuredQuery::new("x", None), 0).await);
    }

    #[tokio::test]
    async fn test_nan_scores_do_not_outrank_real_ones() {
        let store = Arc::new(RecordingStore::with_hits(vec![
            hit(film("A", 2000, 90, &["Drama"], &[]), f32::NAN),
            hit(film("B", 2000, 90, &["Drama"], &[]), 0.4),
        ]));
        let r = retriever(r#"{"query": "x", "filter": "NO_FILTER"}"#, store);

        let docs = r.search(&StructuredQuery::new("x", None), 2).await.unwrap();
        assert_eq!(docs[0].document.title(), "B");
        assert!(docs[1].score.is_nan());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_not_an_empty_result() {
        let r = retriever(r#"{"query": "x", "filter": "NO_FILTER"}"#, Arc::new(RecordingStore::unavailable()));
        assert!(matches!(
            r.retrieve("anything", 5).await,
            Err(RosebudError::RetrievalUnavailable(_))
        ));
    }
}
