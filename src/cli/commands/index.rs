//! Index command: load films into the local store.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::vector_store::{load_documents, open_indexable_store};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Run the index command.
pub async fn run_index(file: &str, batch_size: usize, settings: Settings) -> Result<()> {
    preflight::check(Operation::Index, &settings)?;

    let path = Settings::expand_path(file);
    let documents = load_documents(&path)?;
    if documents.is_empty() {
        Output::warning("The file contains no films.");
        return Ok(());
    }
    Output::info(&format!("Read {} films from {}", documents.len(), path.display()));

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(
        &settings.models.embedding,
        settings.models.embedding_dimensions as usize,
    )?);
    let store = open_indexable_store(&settings, embedder)?;

    let progress = Output::progress_bar(documents.len() as u64, "Embedding and indexing");
    let mut indexed = 0;
    for batch in documents.chunks(batch_size.max(1)) {
        match store.upsert_batch(batch).await {
            Ok(count) => {
                indexed += count;
                progress.inc(batch.len() as u64);
            }
            Err(e) => {
                progress.abandon();
                Output::error(&format!("Indexing stopped after {} films: {}", indexed, e));
                return Err(e.into());
            }
        }
    }
    progress.finish_and_clear();

    let total = store.document_count().await?;
    info!("Indexed {} films into {}", indexed, store.name());
    Output::success(&format!("Indexed {} films ({} in the {} store)", indexed, total, store.name()));

    Ok(())
}
