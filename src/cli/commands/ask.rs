//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::feedback::{FeedbackLogger, FeedbackRecord, JsonlFeedbackSink, Sentiment};
use crate::orchestrator::{Pipeline, Recommendation};
use anyhow::Result;
use console::style;
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Run the ask command.
pub async fn run_ask(
    query: &str,
    show_query: bool,
    show_context: bool,
    no_feedback: bool,
    settings: Settings,
) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Recommend, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'rosebud doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let pipeline = Pipeline::from_settings(&settings)?;

    let spinner = Output::spinner("Finding films...");
    let mut stream = pipeline.run(query);
    let mut started = false;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                if !started {
                    spinner.finish_and_clear();
                    println!();
                    started = true;
                }
                Output::chunk(&text)?;
            }
            Err(failure) => {
                spinner.finish_and_clear();
                Output::error(failure.user_message());
                return Err(failure.into());
            }
        }
    }
    spinner.finish_and_clear();
    println!("\n");

    let recommendation = stream.recommendation()?;

    if show_query {
        Output::header("Structured query");
        Output::kv("Search", &recommendation.constructed_query.query);
        Output::kv("Filter", &recommendation.constructed_query.filter_string());
    }

    if show_context {
        Output::header("Retrieved films");
        for hit in &recommendation.documents {
            Output::film(hit);
        }
        println!();
    }

    if !recommendation.grounding.is_clean() {
        if !recommendation.grounding.ungrounded.is_empty() {
            Output::warning(&format!(
                "Not among the retrieved films: {}",
                recommendation.grounding.ungrounded.join(", ")
            ));
        }
        if recommendation.grounding.over_limit {
            Output::warning("The answer recommends more than five films.");
        }
    }

    if settings.feedback.enabled && !no_feedback && !recommendation.documents.is_empty() {
        if let Some(sentiment) = prompt_sentiment()? {
            log_feedback(&settings, sentiment, &recommendation).await;
        }
    }

    Ok(())
}

/// Ask for a thumbs up or down. Anything else skips.
fn prompt_sentiment() -> Result<Option<Sentiment>> {
    print!("{} ", style("Helpful? [y/n, enter to skip]").dim());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.parse().ok())
}

async fn log_feedback(settings: &Settings, sentiment: Sentiment, recommendation: &Recommendation) {
    let sink = Arc::new(JsonlFeedbackSink::new(settings.feedback_path()));
    let (logger, worker) = FeedbackLogger::spawn(sink, settings.feedback.queue_capacity);
    logger.log(FeedbackRecord::from_recommendation(sentiment, recommendation));
    logger.close(worker).await;
    Output::success("Thanks for the feedback!");
}
