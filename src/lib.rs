//! Rosebud - film recommendations by self-querying retrieval
//!
//! Rosebud turns a plain-language request for films into a structured
//! query (a semantic search string plus a metadata filter), runs a
//! filtered similarity search over a film catalogue, and streams back
//! recommendations grounded in the films it found.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `schema` - The film metadata schema the filters are checked against
//! - `query` - Structured queries, the filter grammar, and the LLM query constructor
//! - `filter` - Translation to native store filters and local evaluation
//! - `llm` - Chat completion boundary
//! - `embedding` - Embedding generation
//! - `vector_store` - Document stores (memory, SQLite, Pinecone)
//! - `retriever` - Query construction followed by filtered search
//! - `rag` - Context formatting, answer generation, grounding checks
//! - `orchestrator` - The request pipeline and its state machine
//! - `feedback` - Background logging of thumbs up/down judgments
//! - `config` - Settings and prompt templates
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use rosebud::config::Settings;
//! use rosebud::orchestrator::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = Pipeline::from_settings(&settings)?;
//!
//!     let mut stream = pipeline.run("Dramas in English under two hours that feature pets");
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?);
//!     }
//!     println!("\n{}", stream.structured_query()?);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod query;
pub mod rag;
pub mod retriever;
pub mod schema;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, RosebudError};
