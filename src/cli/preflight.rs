//! Pre-flight checks before expensive operations.
//!
//! Validates that credentials and store settings are present before
//! starting a request that would otherwise fail midway.

use crate::config::{Settings, StoreProvider};
use crate::error::{Result, RosebudError};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Recommendations need the API key and a persistent store.
    Recommend,
    /// Showing a constructed query needs the API key but no films.
    Query,
    /// Indexing needs the API key and a local, persistent store.
    Index,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_api_key()?;
    match operation {
        Operation::Query => check_store(settings),
        Operation::Recommend => {
            check_persistent(settings)?;
            check_store(settings)
        }
        Operation::Index => {
            check_persistent(settings)?;
            if settings.vector_store.provider == StoreProvider::Pinecone {
                return Err(RosebudError::Config(
                    "indexing writes to the local store; set vector_store.provider = \"sqlite\"".to_string(),
                ));
            }
            Ok(())
        }
    }
}

/// The memory store starts empty in every process, so films indexed by one
/// command are gone by the next.
fn check_persistent(settings: &Settings) -> Result<()> {
    if settings.vector_store.provider == StoreProvider::Memory {
        return Err(RosebudError::Config(
            "the memory store does not outlive a command; set vector_store.provider = \"sqlite\"".to_string(),
        ));
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(RosebudError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(RosebudError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check the settings the configured store needs.
pub(crate) fn check_store(settings: &Settings) -> Result<()> {
    if settings.vector_store.provider != StoreProvider::Pinecone {
        return Ok(());
    }
    if settings.pinecone_host().is_none() {
        return Err(RosebudError::Config(
            "Pinecone host not set. Add vector_store.pinecone_host or export PINECONE_INDEX_HOST".to_string(),
        ));
    }
    match std::env::var("PINECONE_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        _ => Err(RosebudError::Config(
            "PINECONE_API_KEY not set. Set it with: export PINECONE_API_KEY='...'".to_string(),
        )),
    }
}
