//! OpenAI client configuration with sensible defaults.

use crate::error::{Result, RosebudError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default idle timeout between reads from the OpenAI API (2 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Time allowed to establish a connection.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Create an OpenAI client with the default timeout.
///
/// The API key is read from `OPENAI_API_KEY` by `async-openai`.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client that gives up when a read stalls for `timeout`.
///
/// The limit applies per read rather than to the whole request, so a long
/// streamed answer is not cut off while tokens keep arriving.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client(timeout)?))
}

fn http_client(read_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .read_timeout(read_timeout)
        .build()
        .map_err(|e| RosebudError::Config(format!("Failed to create HTTP client: {}", e)))
}
