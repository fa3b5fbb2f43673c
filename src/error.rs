//! Error types for the folio transformation pipeline.

use thiserror::Error;

/// Pipeline errors.
///
/// Per-attempt failures (`OversizedRequest`, `Service`, `EmptyResponse`) are
/// captured inside a [`UnitResult`](crate::types::UnitResult) and never stop the
/// dispatch loop. Everything else is fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Request exceeds token ceiling: estimated {tokens} tokens, limit {ceiling}")]
    OversizedRequest { tokens: usize, ceiling: usize },

    #[error("Service error: {0}")]
    Service(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Failed to persist {id}: {message}")]
    Persistence { id: String, message: String },

    #[error("Unit {id} abandoned after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Run incomplete: {} unit(s) failed ({})", .0.len(), .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Assembly failed: {0}")]
    Assembly(String),

    #[error("Dispatcher failure: {0}")]
    Dispatch(String),
}

impl PipelineError {
    /// Whether a failed attempt should be handed back to the dispatcher.
    ///
    /// Oversized requests stay retry-eligible even though they recur
    /// deterministically; the attempt cap is what ends them.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::OversizedRequest { .. } => true,
            PipelineError::Service(_) => true,
            PipelineError::EmptyResponse(_) => true,
            _ => false,
        }
    }

    /// Short tag used in operator notices and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::OversizedRequest { .. } => "oversized",
            PipelineError::Service(_) => "service",
            PipelineError::EmptyResponse(_) => "empty",
            PipelineError::Persistence { .. } => "persistence",
            PipelineError::RetriesExhausted { .. } => "exhausted",
            PipelineError::Incomplete(_) => "incomplete",
            PipelineError::ConfigError(_) => "config",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::Assembly(_) => "assembly",
            PipelineError::Dispatch(_) => "dispatch",
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
