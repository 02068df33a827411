//! Chat completion boundary shared by the query constructor and the answer generator.

mod openai;

pub use openai::OpenAICompletion;

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Incremental text produced by a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat completion service bound to one model.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run a completion and return the full text.
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    /// Run a completion and return text chunks as they arrive.
    ///
    /// Dropping the stream must release the underlying connection.
    async fn complete_stream(&self, messages: &[ChatMessage], temperature: f32) -> Result<TextStream>;

    /// The model this service is bound to.
    fn model(&self) -> &str;
}
