//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(query: &str, limit: usize, settings: Settings) -> Result<()> {
    preflight::check(Operation::Recommend, &settings)?;

    let pipeline = Pipeline::from_settings(&settings)?;

    let spinner = Output::spinner("Searching...");
    let result = pipeline.retriever().retrieve(query, limit).await;
    spinner.finish_and_clear();

    match result {
        Ok(result) => {
            Output::kv("Search", &result.query.query);
            Output::kv("Filter", &result.query.filter_string());

            if result.is_empty() {
                Output::warning("No films match your request.");
            } else {
                Output::success(&format!("Found {} films", result.documents.len()));
                for hit in &result.documents {
                    Output::film(hit);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
