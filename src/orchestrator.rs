//! Pipeline orchestrator for Rosebud.
//!
//! Coordinates one request from free text to a streamed recommendation:
//! query construction, retrieval, then generation. Each request runs in
//! its own task; nothing mutable is shared between requests.

use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, RosebudError};
use crate::filter::FilterTranslator;
use crate::llm::{CompletionService, OpenAICompletion};
use crate::query::{ConstructorConfig, LlmQueryConstructor, StructuredQuery};
use crate::rag::grounding::{self, GroundingReport};
use crate::rag::{format_context, AnswerGenerator, LlmAnswerGenerator};
use crate::retriever::{Retriever, SelfQueryRetriever};
use crate::vector_store::{open_store, DocumentStore, ScoredDocument};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Instrument};

/// Chunks buffered between the producer task and the reader.
const CHANNEL_CAPACITY: usize = 32;

/// A stage of the pipeline that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ConstructingQuery,
    Retrieving,
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ConstructingQuery => "constructing-query",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a request, with the stage it happened in.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: Arc<RosebudError>,
}

impl PipelineFailure {
    fn new(stage: Stage, error: RosebudError) -> Self {
        Self {
            stage,
            error: Arc::new(error),
        }
    }

    /// Text suitable for showing to the person who asked.
    pub fn user_message(&self) -> &'static str {
        match self.error.as_ref() {
            RosebudError::MalformedQuery(_) | RosebudError::FilterParse(_) => {
                "Sorry, I couldn't understand that query. Try rephrasing it."
            }
            RosebudError::UnsupportedOperator(_) => {
                "Sorry, that request needs a kind of filter the film index can't express. Try rephrasing it."
            }
            RosebudError::InvalidInput(_) => "Please describe the kind of film you're looking for.",
            e if e.is_transient() => {
                "The film index is temporarily unavailable. Please try again in a moment."
            }
            _ => "Sorry, something went wrong while finding films. Please try again.",
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Everything produced for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub query: String,
    pub constructed_query: StructuredQuery,
    /// The formatted documents handed to the generator.
    pub context: String,
    pub answer: String,
    pub documents: Vec<ScoredDocument>,
    pub grounding: GroundingReport,
}

/// Where a request currently is.
#[derive(Debug, Clone)]
pub enum PipelineState {
    Idle,
    ConstructingQuery,
    Retrieving,
    Generating,
    Complete(Arc<Recommendation>),
    Failed(PipelineFailure),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::ConstructingQuery => "constructing-query",
            PipelineState::Retrieving => "retrieving",
            PipelineState::Generating => "generating",
            PipelineState::Complete(_) => "complete",
            PipelineState::Failed(_) => "failed",
        }
    }

    /// The stage a request in this state is in, or about to enter.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Idle | PipelineState::ConstructingQuery => Some(Stage::ConstructingQuery),
            PipelineState::Retrieving => Some(Stage::Retrieving),
            PipelineState::Generating => Some(Stage::Generating),
            PipelineState::Complete(_) => None,
            PipelineState::Failed(failure) => Some(failure.stage),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete(_) | PipelineState::Failed(_))
    }
}

type Chunk = std::result::Result<String, PipelineFailure>;

/// The recommendation pipeline. Cheap to clone and safe to share.
#[derive(Clone)]
pub struct Pipeline {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
}

impl Pipeline {
    pub fn new(retriever: Arc<dyn Retriever>, generator: Arc<dyn AnswerGenerator>, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    /// Build the production pipeline: OpenAI models and the configured store.
    ///
    /// Fails fast when the few-shot examples or the translator do not
    /// cover the allowed comparators and operators.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(
            &settings.models.embedding,
            settings.models.embedding_dimensions as usize,
        )?);
        let store = open_store(settings, embedder)?;

        info!(
            "Using {} store with {} for queries and {} for answers",
            store.name(),
            settings.models.retriever,
            settings.models.summary
        );

        Self::with_components(
            settings,
            prompts,
            store,
            Arc::new(OpenAICompletion::new(&settings.models.retriever)?),
            Arc::new(OpenAICompletion::new(&settings.models.summary)?),
        )
    }

    /// Build a pipeline around custom store and completion services.
    pub fn with_components(
        settings: &Settings,
        prompts: Prompts,
        store: Arc<dyn DocumentStore>,
        query_llm: Arc<dyn CompletionService>,
        answer_llm: Arc<dyn CompletionService>,
    ) -> Result<Self> {
        let [first_year, last_year] = settings.retrieval.years;
        let config = ConstructorConfig::movies(first_year, last_year);
        let translator = FilterTranslator::pinecone();
        config.validate(&translator)?;

        let constructor = LlmQueryConstructor::new(query_llm, config, prompts.clone())
            .with_max_attempts(settings.retrieval.max_query_attempts);
        let retriever = SelfQueryRetriever::new(Arc::new(constructor), translator, store);
        let generator = LlmAnswerGenerator::new(answer_llm, settings.generation.temperature, prompts);

        Ok(Self::new(Arc::new(retriever), Arc::new(generator), settings.retrieval.top_k))
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// The filter translator searches go through.
    pub fn translator(&self) -> &FilterTranslator {
        self.retriever.translator()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Start a request and stream its answer.
    ///
    /// Must be called within a tokio runtime.
    pub fn run(&self, query: &str) -> RecommendationStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);

        let pipeline = self.clone();
        let query = query.to_string();
        let span = tracing::info_span!("recommend", query = %query);
        let task = tokio::spawn(async move { pipeline.produce(query, tx, state_tx).await }.instrument(span));

        RecommendationStream {
            chunks: rx,
            state: state_rx,
            task,
        }
    }

    /// Run a request to completion and return the full recommendation.
    pub async fn run_sync(&self, query: &str) -> std::result::Result<Recommendation, PipelineFailure> {
        self.run(query).finish().await
    }

    async fn produce(self, query: String, tx: mpsc::Sender<Chunk>, state: watch::Sender<PipelineState>) {
        let fail = |stage: Stage, error: RosebudError| {
            let failure = PipelineFailure::new(stage, error);
            warn!("Request failed: {}", failure);
            state.send_replace(PipelineState::Failed(failure.clone()));
            failure
        };

        state.send_replace(PipelineState::ConstructingQuery);
        let constructed = match self.retriever.construct(&query).await {
            Ok(constructed) => constructed,
            Err(e) => {
                let _ = tx.send(Err(fail(Stage::ConstructingQuery, e))).await;
                return;
            }
        };
        debug!("Structured query: {} | {}", constructed.query, constructed.filter_string());

        state.send_replace(PipelineState::Retrieving);
        let documents = match self.retriever.search(&constructed, self.top_k).await {
            Ok(documents) => documents,
            Err(e) => {
                let _ = tx.send(Err(fail(Stage::Retrieving, e))).await;
                return;
            }
        };

        state.send_replace(PipelineState::Generating);
        let context = format_context(&documents);
        let mut chunks = self.generator.generate(&query, &documents).await;
        let mut answer = String::new();
        while let Some(chunk) = chunks.next().await {
            answer.push_str(&chunk);
            if tx.send(Ok(chunk)).await.is_err() {
                debug!("Reader went away, stopping generation");
                return;
            }
        }

        let report = grounding::check(&answer, &documents);
        if !report.is_clean() {
            warn!(
                "Answer is not grounded in the retrieved films (unknown: {:?}, over limit: {})",
                report.ungrounded, report.over_limit
            );
        }

        info!("Recommended {} films", report.recommended.len());
        state.send_replace(PipelineState::Complete(Arc::new(Recommendation {
            query,
            constructed_query: constructed,
            context,
            answer,
            documents,
            grounding: report,
        })));
    }
}

/// A running request: answer chunks plus its observable state.
///
/// Dropping the stream cancels the request.
pub struct RecommendationStream {
    chunks: mpsc::Receiver<Chunk>,
    state: watch::Receiver<PipelineState>,
    task: JoinHandle<()>,
}

impl RecommendationStream {
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// The finished recommendation, once the answer is fully streamed.
    pub fn recommendation(&self) -> Result<Arc<Recommendation>> {
        match &*self.state.borrow() {
            PipelineState::Complete(recommendation) => Ok(recommendation.clone()),
            _ => Err(RosebudError::NotYetAvailable("recommendation")),
        }
    }

    pub fn structured_query(&self) -> Result<StructuredQuery> {
        self.recommendation()
            .map(|r| r.constructed_query.clone())
            .map_err(|_| RosebudError::NotYetAvailable("structured query"))
    }

    pub fn context(&self) -> Result<String> {
        self.recommendation()
            .map(|r| r.context.clone())
            .map_err(|_| RosebudError::NotYetAvailable("context"))
    }

    pub fn failure(&self) -> Option<PipelineFailure> {
        match &*self.state.borrow() {
            PipelineState::Failed(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Stop the request and release the upstream completion.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.chunks.close();
    }

    /// Drain the stream and return the recommendation.
    pub async fn finish(mut self) -> std::result::Result<Recommendation, PipelineFailure> {
        while let Some(chunk) = self.next().await {
            chunk?;
        }

        match self.state() {
            PipelineState::Complete(recommendation) => Ok(recommendation.as_ref().clone()),
            PipelineState::Failed(failure) => Err(failure),
            other => Err(PipelineFailure::new(
                other.stage().unwrap_or(Stage::Generating),
                RosebudError::Generation(format!("request ended while {}", other.name())),
            )),
        }
    }
}

impl Stream for RecommendationStream {
    type Item = Chunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().chunks.poll_recv(cx)
    }
}

impl Drop for RecommendationStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
