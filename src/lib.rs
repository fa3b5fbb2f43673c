//! Folio: chapter-by-chapter document transformation through a
//! rate-limited text-generation service.
//!
//! Units are extracted from a document, each is sent with a window of
//! neighbouring units as context, launches are spaced to respect the model's
//! requests-per-minute budget, and failed attempts are retried with backoff
//! until every unit is done or has exhausted its attempts.

pub mod cli;
pub mod config;
pub mod context;
pub mod cost;
pub mod document;
pub mod error;
pub mod logging;
pub mod pacer;
pub mod pipeline;
pub mod provider;
pub mod rate;
pub mod report;
pub mod scheduler;
pub mod types;

pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOptions, RunSummary};
pub use types::{Request, RequestTemplate, SourceEntry, Submission, Unit, UnitResult, UnitSet};
