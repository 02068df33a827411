//! Fire-and-forget logging of thumbs up/down judgments.
//!
//! Records go through a bounded queue to a background worker. Neither a
//! full queue nor a failing sink ever reaches the caller.

use crate::error::Result;
use crate::orchestrator::Recommendation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "up" | "y" | "yes" | "+" => Ok(Sentiment::Positive),
            "negative" | "down" | "n" | "no" | "-" => Ok(Sentiment::Negative),
            other => Err(format!("Unknown sentiment: {}", other)),
        }
    }
}

/// One judgment, with everything needed to reproduce the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub query: String,
    /// The structured query in `query=... filter=...` form.
    pub constructed_query: String,
    pub context: String,
    pub answer: String,
}

impl FeedbackRecord {
    pub fn new(
        sentiment: Sentiment,
        query: impl Into<String>,
        constructed_query: impl Into<String>,
        context: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            sentiment,
            query: query.into(),
            constructed_query: constructed_query.into(),
            context: context.into(),
            answer: answer.into(),
        }
    }

    pub fn from_recommendation(sentiment: Sentiment, recommendation: &Recommendation) -> Self {
        Self::new(
            sentiment,
            &recommendation.query,
            recommendation.constructed_query.to_string(),
            &recommendation.context,
            &recommendation.answer,
        )
    }
}

/// Where feedback records end up.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn write(&self, record: &FeedbackRecord) -> Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonlFeedbackSink {
    path: PathBuf,
}

impl JsonlFeedbackSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FeedbackSink for JsonlFeedbackSink {
    async fn write(&self, record: &FeedbackRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct FeedbackStats {
    logged: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl FeedbackStats {
    pub fn logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }

    /// Records the sink rejected.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Records discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle for queueing feedback. Cheap to clone.
#[derive(Clone)]
pub struct FeedbackLogger {
    tx: mpsc::Sender<FeedbackRecord>,
    stats: Arc<FeedbackStats>,
}

impl FeedbackLogger {
    /// Start the background worker. Must be called within a tokio runtime.
    pub fn spawn(sink: Arc<dyn FeedbackSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<FeedbackRecord>(capacity.max(1));
        let stats = Arc::new(FeedbackStats::default());

        let worker_stats = stats.clone();
        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match sink.write(&record).await {
                    Ok(()) => {
                        worker_stats.logged.fetch_add(1, Ordering::Relaxed);
                        debug!("Logged {:?} feedback", record.sentiment);
                    }
                    Err(e) => {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Failed to log feedback: {}", e);
                    }
                }
            }
        });

        (Self { tx, stats }, worker)
    }

    /// Queue a record without waiting.
    pub fn log(&self, record: FeedbackRecord) {
        if let Err(e) = self.tx.try_send(record) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Feedback dropped: {}", e);
        }
    }

    pub fn stats(&self) -> &FeedbackStats {
        &self.stats
    }

    /// Stop accepting records and wait for the queue to drain.
    ///
    /// The worker finishes once every clone of the logger is gone.
    pub async fn close(self, worker: JoinHandle<()>) {
        drop(self.tx);
        if let Err(e) = worker.await {
            warn!("Feedback worker ended abnormally: {}", e);
        }
    }
}
