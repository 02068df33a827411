//! OpenAI chat completions.

use super::{ChatMessage, CompletionService, Role, TextStream};
use crate::error::{Result, RosebudError};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Chat completion service backed by the OpenAI API.
pub struct OpenAICompletion {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAICompletion {
    /// Create a completion service for the given model.
    pub fn new(model: &str) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
        })
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(temperature)
            .stream(stream)
            .build()
            .map_err(|e| RosebudError::OpenAI(format!("Failed to build request: {}", e)))
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let built: ChatCompletionRequestMessage = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| RosebudError::OpenAI(e.to_string()))?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| RosebudError::OpenAI(e.to_string()))?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| RosebudError::OpenAI(e.to_string()))?
            .into(),
    };
    Ok(built)
}

#[async_trait]
impl CompletionService for OpenAICompletion {
    #[instrument(skip(self, messages), fields(model = %self.model))]
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let request = self.build_request(messages, temperature, false)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| RosebudError::OpenAI(format!("Chat completion failed: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RosebudError::OpenAI("Empty response from LLM".to_string()))?;

        debug!("Completion returned {} chars", content.len());
        Ok(content)
    }

    #[instrument(skip(self, messages), fields(model = %self.model))]
    async fn complete_stream(&self, messages: &[ChatMessage], temperature: f32) -> Result<TextStream> {
        let request = self.build_request(messages, temperature, true)?;

        let upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| RosebudError::OpenAI(format!("Failed to open stream: {}", e)))?;

        let chunks = upstream.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(RosebudError::Generation(format!("Stream error: {}", e)))),
            }
        });

        Ok(Box::pin(chunks))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
