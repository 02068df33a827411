//! HTTP API server for the chat front end and other integrations.
//!
//! Provides REST endpoints for streamed and complete recommendations,
//! query inspection, and feedback.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::RosebudError;
use crate::feedback::{FeedbackLogger, FeedbackRecord, JsonlFeedbackSink, Sentiment};
use crate::orchestrator::{Pipeline, PipelineFailure};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared application state.
pub struct AppState {
    pipeline: Pipeline,
    feedback: Option<FeedbackLogger>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, feedback: Option<FeedbackLogger>) -> Self {
        Self { pipeline, feedback }
    }
}

/// Build the API routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/recommend", post(recommend))
        .route("/recommend/sync", post(recommend_sync))
        .route("/query", post(construct_query))
        .route("/feedback", post(feedback))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    preflight::check(Operation::Recommend, &settings)?;

    let pipeline = Pipeline::from_settings(&settings)?;

    let feedback = if settings.feedback.enabled {
        let sink = Arc::new(JsonlFeedbackSink::new(settings.feedback_path()));
        let (logger, _worker) = FeedbackLogger::spawn(sink, settings.feedback.queue_capacity);
        Some(logger)
    } else {
        None
    };

    let app = router(Arc::new(AppState::new(pipeline, feedback)));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    Output::header("Rosebud API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Recommend (streamed)", "POST /recommend");
    Output::kv("Recommend (complete)", "POST /recommend/sync");
    Output::kv("Structured query", "POST /query");
    Output::kv("Feedback", "POST /feedback");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct RecommendRequest {
    query: String,
}

#[derive(Serialize)]
struct QueryResponse {
    query: String,
    filter: String,
    native_filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct FeedbackRequest {
    sentiment: Sentiment,
    query: String,
    #[serde(default)]
    constructed_query: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    answer: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
}

fn status_for(error: &RosebudError) -> StatusCode {
    match error {
        RosebudError::MalformedQuery(_)
        | RosebudError::FilterParse(_)
        | RosebudError::UnsupportedOperator(_)
        | RosebudError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response(failure: &PipelineFailure) -> Response {
    (
        status_for(&failure.error),
        Json(ErrorResponse {
            error: failure.user_message().to_string(),
            stage: Some(failure.stage.to_string()),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Streams the answer as plain text. Pre-generation failures become an
/// error status instead of a body.
async fn recommend(State(state): State<Arc<AppState>>, Json(req): Json<RecommendRequest>) -> Response {
    let mut stream = state.pipeline.run(&req.query);

    let first = match stream.next().await {
        Some(Ok(text)) => text,
        Some(Err(failure)) => return failure_response(&failure),
        None => String::new(),
    };

    let rest = stream.map(|chunk| {
        let text = match chunk {
            Ok(text) => text,
            Err(failure) => format!("\n\n{}", failure.user_message()),
        };
        Ok::<_, Infallible>(text)
    });
    let body = futures::stream::once(async move { Ok::<_, Infallible>(first) }).chain(rest);

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

async fn recommend_sync(State(state): State<Arc<AppState>>, Json(req): Json<RecommendRequest>) -> Response {
    match state.pipeline.run_sync(&req.query).await {
        Ok(recommendation) => Json(recommendation).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

async fn construct_query(State(state): State<Arc<AppState>>, Json(req): Json<RecommendRequest>) -> Response {
    let constructed = match state.pipeline.retriever().construct(&req.query).await {
        Ok(constructed) => constructed,
        Err(e) => {
            return (
                status_for(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                    stage: None,
                }),
            )
                .into_response()
        }
    };

    match state.pipeline.translator().translate_query(&constructed) {
        Ok(native) => Json(QueryResponse {
            filter: constructed.filter_string(),
            query: constructed.query,
            native_filter: native.map(|f| f.as_json().clone()),
        })
        .into_response(),
        Err(e) => (
            status_for(&e),
            Json(ErrorResponse {
                error: e.to_string(),
                stage: None,
            }),
        )
            .into_response(),
    }
}

async fn feedback(State(state): State<Arc<AppState>>, Json(req): Json<FeedbackRequest>) -> Response {
    let Some(logger) = &state.feedback else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "feedback logging is disabled".to_string(),
                stage: None,
            }),
        )
            .into_response();
    };

    logger.log(FeedbackRecord::new(
        req.sentiment,
        req.query,
        req.constructed_query,
        req.context,
        req.answer,
    ));
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::testing::{film, hit, RecordingStore, ScriptedCompletion};
    use serde_json::{json, Value};

    const QUERY_REPLY: &str =
        r#"{"query": "pets", "filter": "and(eq(\"Genre\", \"Drama\"), lt(\"Runtime (minutes)\", 120))"}"#;

    fn pipeline(store: RecordingStore) -> Pipeline {
        Pipeline::with_components(
            &Settings::default(),
            Prompts::default(),
            Arc::new(store),
            Arc::new(ScriptedCompletion::always(QUERY_REPLY)),
            Arc::new(ScriptedCompletion::new(&[]).with_stream(&["- **Marley**:", " a dog and a family."])),
        )
        .unwrap()
    }

    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn marley() -> RecordingStore {
        RecordingStore::with_hits(vec![hit(film("Marley", 2008, 115, &["Drama"], &["Hulu"]), 0.9)])
    }

    #[tokio::test]
    async fn test_recommend_streams_plain_text() {
        let base = serve(AppState::new(pipeline(marley()), None)).await;
        let response = reqwest::Client::new()
            .post(format!("{}/recommend", base))
            .json(&json!({"query": "dramas about pets"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "- **Marley**: a dog and a family.");
    }

    #[tokio::test]
    async fn test_unavailable_store_is_service_unavailable() {
        let base = serve(AppState::new(pipeline(RecordingStore::unavailable()), None)).await;
        let client = reqwest::Client::new();

        for path in ["/recommend", "/recommend/sync"] {
            let response = client
                .post(format!("{}{}", base, path))
                .json(&json!({"query": "dramas about pets"}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["stage"], json!("retrieving"));
        }
    }

    #[tokio::test]
    async fn test_recommend_sync_returns_recommendation() {
        let base = serve(AppState::new(pipeline(marley()), None)).await;
        let body: Value = reqwest::Client::new()
            .post(format!("{}/recommend/sync", base))
            .json(&json!({"query": "dramas about pets"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["constructed_query"]["query"], json!("pets"));
        assert_eq!(body["grounding"]["recommended"], json!(["Marley"]));
        assert!(body["context"].as_str().unwrap().contains("Marley: a film."));
    }

    #[tokio::test]
    async fn test_query_returns_native_filter() {
        let base = serve(AppState::new(pipeline(marley()), None)).await;
        let body: Value = reqwest::Client::new()
            .post(format!("{}/query", base))
            .json(&json!({"query": "dramas about pets under two hours"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["query"], json!("pets"));
        assert_eq!(
            body["native_filter"],
            json!({"$and": [{"Genre": {"$eq": "Drama"}}, {"Runtime (minutes)": {"$lt": 120}}]})
        );
    }

    #[tokio::test]
    async fn test_query_uses_the_pipeline_translator() {
        use crate::filter::FilterTranslator;
        use crate::query::{Comparator, ConstructorConfig, LlmQueryConstructor, Operator};
        use crate::rag::LlmAnswerGenerator;
        use crate::retriever::SelfQueryRetriever;

        let reply = r#"{"query": "pets", "filter": "or(eq(\"Genre\", \"Drama\"), eq(\"Genre\", \"Comedy\"))"}"#;
        let constructor = LlmQueryConstructor::new(
            Arc::new(ScriptedCompletion::always(reply)),
            ConstructorConfig::movies(1950, 2024),
            Prompts::default(),
        );
        let and_only = FilterTranslator::new(Comparator::ALL.to_vec(), vec![Operator::And]);
        let retriever = SelfQueryRetriever::new(Arc::new(constructor), and_only, Arc::new(marley()));
        let generator = LlmAnswerGenerator::new(Arc::new(ScriptedCompletion::new(&[])), 0.0, Prompts::default());
        let pipeline = Pipeline::new(Arc::new(retriever), Arc::new(generator), 5);

        let base = serve(AppState::new(pipeline, None)).await;
        let response = reqwest::Client::new()
            .post(format!("{}/query", base))
            .json(&json!({"query": "dramas or comedies about pets"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_feedback_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let (logger, worker) = FeedbackLogger::spawn(Arc::new(JsonlFeedbackSink::new(&path)), 4);
        let base = serve(AppState::new(pipeline(marley()), Some(logger.clone()))).await;

        let response = reqwest::Client::new()
            .post(format!("{}/feedback", base))
            .json(&json!({"sentiment": "positive", "query": "dramas about pets", "answer": "- **Marley**:"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

        for _ in 0..100 {
            if logger.stats().logged() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(logger.stats().logged(), 1);
        worker.abort();

        let line = std::fs::read_to_string(&path).unwrap();
        let record: FeedbackRecord = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(record.sentiment, Sentiment::Positive);
        assert_eq!(record.query, "dramas about pets");
    }

    #[tokio::test]
    async fn test_feedback_disabled_is_not_found() {
        let base = serve(AppState::new(pipeline(marley()), None)).await;
        let response = reqwest::Client::new()
            .post(format!("{}/feedback", base))
            .json(&json!({"sentiment": "negative", "query": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
