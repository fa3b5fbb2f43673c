//! Generation service clients
//!
//! One client is built per run and shared by every in-flight attempt. Clients
//! return the first candidate's text verbatim; anything else is an error the
//! executor records on the attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::Request;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiCompatibleClient;

/// Client for an external text-generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Make one call and return the first candidate's text.
    async fn generate(&self, request: &Request) -> Result<String, PipelineError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Which wire protocol a run talks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenaiCompatible,
}

impl std::str::FromStr for ProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" | "openai_compatible" | "openai-compatible" => {
                Ok(ProviderKind::OpenaiCompatible)
            }
            other => Err(PipelineError::ConfigError(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

/// Everything needed to build a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

pub struct ClientFactory;

impl ClientFactory {
    pub fn create_client(
        settings: &ProviderSettings,
    ) -> Result<Box<dyn GenerationClient>, PipelineError> {
        match settings.kind {
            ProviderKind::Gemini => Ok(Box::new(GeminiClient::new(
                settings.model.clone(),
                settings.api_key.clone(),
                settings.base_url.clone(),
            )?)),
            ProviderKind::OpenaiCompatible => Ok(Box::new(OpenAiCompatibleClient::new(
                settings.model.clone(),
                settings.api_key.clone(),
                settings.base_url.clone(),
            )?)),
        }
    }
}

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub(crate) fn build_http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(client_setup_error)
}

/// A client that cannot be built is a setup problem, not a failed attempt.
pub(crate) fn client_setup_error(err: impl std::fmt::Display) -> PipelineError {
    PipelineError::ConfigError(format!("Failed to create HTTP client: {}", err))
}

/// Drops the request URL so endpoints and query parameters never reach logs.
pub(crate) fn map_http_error(error: reqwest::Error) -> PipelineError {
    let error = error.without_url();
    if error.is_timeout() {
        PipelineError::Service(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        PipelineError::Service(format!("Connection error: {}", error))
    } else if let Some(status) = error.status() {
        status_error(status.as_u16(), &error.to_string())
    } else {
        PipelineError::Service(format!("HTTP error: {}", error))
    }
}

pub(crate) fn status_error(status: u16, body: &str) -> PipelineError {
    match status {
        401 | 403 => PipelineError::Service(format!("Authentication failed: {}", body)),
        404 => PipelineError::Service(format!("Model not found: {}", body)),
        429 => PipelineError::Service(format!("Rate limit exceeded: {}", body)),
        _ => PipelineError::Service(format!("Request failed with status {}: {}", status, body)),
    }
}

/// Empty text is treated the same as a missing candidate.
pub(crate) fn non_empty(text: String, provider: &str) -> Result<String, PipelineError> {
    if text.is_empty() {
        Err(PipelineError::EmptyResponse(format!(
            "{} returned empty text",
            provider
        )))
    } else {
        Ok(text)
    }
}
