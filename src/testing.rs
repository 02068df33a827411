//! Stub implementations of the boundary traits shared by unit tests.

use crate::embedding::Embedder;
use crate::error::{Result, RosebudError};
use crate::filter::NativeFilter;
use crate::llm::{ChatMessage, CompletionService, TextStream};
use crate::vector_store::{Document, DocumentStore, MovieMetadata, ScoredDocument};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Completion service replaying canned replies and recording every call.
pub(crate) struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    repeat_last: bool,
    stream: Mutex<Option<Vec<std::result::Result<String, String>>>>,
    hang_after_stream: bool,
    pub stream_dropped: Arc<AtomicBool>,
    pub temperatures: Mutex<Vec<f32>>,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            repeat_last: false,
            stream: Mutex::new(None),
            hang_after_stream: false,
            stream_dropped: Arc::new(AtomicBool::new(false)),
            temperatures: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every `complete` call with the same reply.
    pub(crate) fn always(reply: &str) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(&[reply])
        }
    }

    /// Chunks returned by `complete_stream`.
    pub(crate) fn with_stream(self, chunks: &[&str]) -> Self {
        *self.stream.lock().unwrap() = Some(chunks.iter().map(|c| Ok(c.to_string())).collect());
        self
    }

    /// Stream the chunks, then fail with `message`.
    pub(crate) fn with_failing_stream(self, chunks: &[&str], message: &str) -> Self {
        let mut items: Vec<_> = chunks.iter().map(|c| Ok(c.to_string())).collect();
        items.push(Err(message.to_string()));
        *self.stream.lock().unwrap() = Some(items);
        self
    }

    /// Stream the chunks, then never finish.
    pub(crate) fn with_hanging_stream(mut self, chunks: &[&str]) -> Self {
        self.hang_after_stream = true;
        self.with_stream(chunks)
    }

    pub(crate) fn calls(&self) -> usize {
        self.temperatures.lock().unwrap().len()
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        self.temperatures.lock().unwrap().push(temperature);
        self.prompts.lock().unwrap().push(messages.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if self.repeat_last && replies.len() == 1 {
            return Ok(replies[0].clone());
        }
        replies
            .pop_front()
            .ok_or_else(|| RosebudError::OpenAI("script exhausted".to_string()))
    }

    async fn complete_stream(&self, messages: &[ChatMessage], temperature: f32) -> Result<TextStream> {
        self.temperatures.lock().unwrap().push(temperature);
        self.prompts.lock().unwrap().push(messages.to_vec());
        let items = self
            .stream
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RosebudError::OpenAI("connection refused".to_string()))?;

        let guard = DropFlag(self.stream_dropped.clone());
        let chunks = futures::stream::iter(items).map(move |item| {
            let _held = &guard;
            item.map_err(RosebudError::Generation)
        });

        if self.hang_after_stream {
            Ok(Box::pin(chunks.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(chunks))
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Embeds text as counts of a fixed vocabulary, so similarity is predictable.
pub(crate) struct KeywordEmbedder {
    vocabulary: Vec<String>,
}

impl KeywordEmbedder {
    pub(crate) fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(self
            .vocabulary
            .iter()
            .map(|word| text.matches(word.as_str()).count() as f32)
            .collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }
}

/// Store returning fixed hits and recording the filter of every search.
pub(crate) struct RecordingStore {
    hits: Vec<ScoredDocument>,
    fail: bool,
    pub filters: Mutex<Vec<Option<NativeFilter>>>,
    pub queries: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub(crate) fn with_hits(hits: Vec<ScoredDocument>) -> Self {
        Self {
            hits,
            fail: false,
            filters: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::with_hits(Vec::new())
    }

    /// A store whose every search reports it is unreachable.
    pub(crate) fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn search(
        &self,
        query: &str,
        filter: Option<&NativeFilter>,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        self.filters.lock().unwrap().push(filter.cloned());
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(RosebudError::RetrievalUnavailable("index unreachable".to_string()));
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A retrieved film with the fields the answer format needs.
pub(crate) fn film(title: &str, year: i64, runtime: i64, genre: &[&str], stream: &[&str]) -> Document {
    let mut metadata = MovieMetadata::titled(title);
    metadata.release_year = Some(year);
    metadata.runtime_minutes = Some(runtime);
    metadata.language = Some("English".to_string());
    metadata.genre = genre.iter().map(|g| g.to_string()).collect();
    metadata.stream = stream.iter().map(|s| s.to_string()).collect();
    Document {
        id: title.to_lowercase().replace(' ', "-"),
        content: format!("{}: a film.", title),
        metadata,
    }
}

pub(crate) fn hit(document: Document, score: f32) -> ScoredDocument {
    ScoredDocument { document, score }
}
