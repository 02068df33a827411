//! Eval command: run the evaluation question set and record the outputs.
//!
//! Scoring is left to external tooling; this only produces the
//! query, context and answer for each question.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{Pipeline, Recommendation};
use anyhow::Result;
use futures::StreamExt;
use serde::Serialize;
use std::io::Write;

/// One question per kind of request the recommender should handle.
pub const EVAL_QUESTIONS: &[&str] = &[
    "Suggest a good movie based on a book.",
    "Suggest a film for a cozy night in.",
    "What are some must-watch horror movies?",
    "Recommend a film about overcoming adversity.",
    "Can you suggest a movie set in ancient Rome?",
    "What are some essential movies to watch in the Marvel Cinematic Universe?",
    "What are some lesser-known indie films worth watching?",
    "What's a good starting point if I want to explore Japanese cinema?",
    "What's a good movie for a group with varied tastes?",
    "I loved Inception and The Matrix. What should I watch next?",
    "What are some highly rated documentary films?",
    "I'm looking for a good horror movie from the 1970s.",
    "Can you suggest a good movie set in the 1980s?",
    "What are some great Christmas movies?",
    "Recommend a movie that is set in the future.",
    "Suggest a movie that blends horror and science fiction.",
    "Recommend a film with a strong female lead.",
    "Can you suggest a movie with a surprising twist at the end?",
    "Can you suggest a film with Leonardo DiCaprio in the lead role?",
    "I want some fantasy movies featuring dragons that are under 90 minutes long.",
];

/// One line of evaluation output.
#[derive(Debug, Serialize)]
pub struct EvalRecord {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructed_query: Option<String>,
    pub context: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Recommendation> for EvalRecord {
    fn from(r: Recommendation) -> Self {
        Self {
            constructed_query: Some(r.constructed_query.to_string()),
            query: r.query,
            context: r.context,
            answer: r.answer,
            error: None,
        }
    }
}

/// Run every question through the pipeline, at most `concurrency` at a time.
///
/// Results come back in question order.
pub async fn evaluate(pipeline: &Pipeline, questions: &[&str], concurrency: usize) -> Vec<EvalRecord> {
    futures::stream::iter(questions.iter().map(|q| async move {
        match pipeline.run_sync(q).await {
            Ok(recommendation) => EvalRecord::from(recommendation),
            Err(failure) => EvalRecord {
                query: q.to_string(),
                constructed_query: None,
                context: String::new(),
                answer: String::new(),
                error: Some(failure.to_string()),
            },
        }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}

/// Run the eval command.
pub async fn run_eval(output: Option<String>, concurrency: usize, settings: Settings) -> Result<()> {
    preflight::check(Operation::Recommend, &settings)?;

    let pipeline = Pipeline::from_settings(&settings)?;

    let spinner = Output::spinner(&format!("Running {} evaluation questions...", EVAL_QUESTIONS.len()));
    let records = evaluate(&pipeline, EVAL_QUESTIONS, concurrency).await;
    spinner.finish_and_clear();

    let mut lines = String::new();
    for record in &records {
        lines.push_str(&serde_json::to_string(record)?);
        lines.push('\n');
    }

    match output {
        Some(path) => {
            let path = Settings::expand_path(&path);
            std::fs::write(&path, lines)?;
            Output::success(&format!("Wrote {} results to {}", records.len(), path.display()));
        }
        None => std::io::stdout().write_all(lines.as_bytes())?,
    }

    let failed = records.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        Output::warning(&format!("{} of {} questions failed", failed, records.len()));
    }

    Ok(())
}
