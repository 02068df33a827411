//! Streaming recommendation generation.

use super::context::format_context;
use crate::config::Prompts;
use crate::llm::{ChatMessage, CompletionService};
use crate::vector_store::ScoredDocument;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Text chunks of a recommendation. Failures arrive as explanatory text.
pub type AnswerStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// The whole answer when nothing was retrieved.
pub const NO_MATCHES: &str = "I couldn't find any films that match your request. \
Try loosening it a little, for example a wider year range, another genre, or a different streaming service.";

/// Emitted when the completion service fails, alone or after partial output.
pub const GENERATION_FAILED: &str =
    "Sorry, something went wrong while writing your recommendations. Please try again.";

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Stream a recommendation for `query` grounded in `documents`.
    ///
    /// Never fails: errors become a final explanatory chunk.
    async fn generate(&self, query: &str, documents: &[ScoredDocument]) -> AnswerStream;
}

/// Generator backed by a streaming chat completion.
pub struct LlmAnswerGenerator {
    llm: Arc<dyn CompletionService>,
    temperature: f32,
    prompts: Prompts,
}

impl LlmAnswerGenerator {
    pub fn new(llm: Arc<dyn CompletionService>, temperature: f32, prompts: Prompts) -> Self {
        Self {
            llm,
            temperature,
            prompts,
        }
    }

    fn messages(&self, query: &str, documents: &[ScoredDocument]) -> Vec<ChatMessage> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), query.to_string());
        vars.insert("context".to_string(), format_context(documents));

        let system = self
            .prompts
            .render_with_custom(&self.prompts.recommend.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.recommend.user, &vars);
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

fn single(text: &str) -> AnswerStream {
    Box::pin(futures::stream::once(futures::future::ready(text.to_string())))
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    #[instrument(skip(self, documents), fields(model = %self.llm.model(), documents = documents.len()))]
    async fn generate(&self, query: &str, documents: &[ScoredDocument]) -> AnswerStream {
        if documents.is_empty() {
            debug!("No documents retrieved, answering without the model");
            return single(NO_MATCHES);
        }

        let messages = self.messages(query, documents);
        let upstream = match self.llm.complete_stream(&messages, self.temperature).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not start generation: {}", e);
                return single(GENERATION_FAILED);
            }
        };

        let chunks = upstream.scan(false, |failed, item| {
            let next = match item {
                _ if *failed => None,
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Generation failed mid-stream: {}", e);
                    *failed = true;
                    Some(format!("\n\n{}", GENERATION_FAILED))
                }
            };
            futures::future::ready(next)
        });

        Box::pin(chunks)
    }
}
