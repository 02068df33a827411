//! Query command: show how a request would be searched.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use anyhow::Result;

/// Run the query command.
pub async fn run_query(query: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Query, &settings)?;

    let pipeline = Pipeline::from_settings(&settings)?;

    let spinner = Output::spinner("Constructing query...");
    let constructed = pipeline.retriever().construct(query).await;
    spinner.finish_and_clear();
    let constructed = constructed?;

    let native = pipeline.translator().translate_query(&constructed)?;

    Output::header("Structured query");
    Output::kv("Search", &constructed.query);
    Output::kv("Filter", &constructed.filter_string());
    match native {
        Some(filter) => Output::kv("Native filter", &serde_json::to_string_pretty(filter.as_json())?),
        None => Output::kv("Native filter", "none (unfiltered search)"),
    }

    Ok(())
}
