//! Core value types shared by the scheduling pipeline.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;

/// One extractable content segment of the source document.
///
/// Immutable once loaded. `ordinal` is the unit's position in the document
/// sequence and is what context building indexes by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: String,
    pub content: String,
    pub ordinal: usize,
}

/// An entry produced by a document source before the unit set is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub id: String,
    pub content: String,
    /// Output for this entry already exists; it is context only and is not submitted.
    pub processed: bool,
}

impl SourceEntry {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            processed: false,
        }
    }

    pub fn processed(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            processed: true,
        }
    }
}

/// Order-preserving, addressable container of every unit in a document.
///
/// Built once in full before any context is derived; never mutated after.
#[derive(Debug, Clone, Default)]
pub struct UnitSet {
    units: Vec<Arc<Unit>>,
    processed: Vec<bool>,
}

impl UnitSet {
    pub fn from_entries(entries: Vec<SourceEntry>) -> Result<Self, PipelineError> {
        let mut units = Vec::with_capacity(entries.len());
        let mut processed = Vec::with_capacity(entries.len());
        let mut seen = std::collections::HashSet::new();

        for (ordinal, entry) in entries.into_iter().enumerate() {
            if !seen.insert(entry.id.clone()) {
                return Err(PipelineError::Extraction(format!(
                    "duplicate unit identifier: {}",
                    entry.id
                )));
            }
            units.push(Arc::new(Unit {
                id: entry.id,
                content: entry.content,
                ordinal,
            }));
            processed.push(entry.processed);
        }

        Ok(Self { units, processed })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&Arc<Unit>> {
        self.units.get(ordinal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units.iter()
    }

    /// Content of every unit in document order.
    pub fn contents(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.content.as_str()).collect()
    }

    pub fn is_processed(&self, ordinal: usize) -> bool {
        self.processed.get(ordinal).copied().unwrap_or(false)
    }

    /// Units that still need a successful generation, in document order.
    pub fn pending(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units
            .iter()
            .zip(self.processed.iter())
            .filter(|(_, done)| !**done)
            .map(|(unit, _)| unit)
    }

    pub fn pending_count(&self) -> usize {
        self.processed.iter().filter(|done| !**done).count()
    }

    pub fn ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.id.clone()).collect()
    }
}

/// A unit queued for one dispatch attempt.
///
/// Context is computed once at construction from the original sequence and
/// carried unchanged through every retry.
#[derive(Debug, Clone)]
pub struct Submission {
    pub unit: Arc<Unit>,
    pub context: Arc<str>,
    /// 1-based attempt number this submission represents.
    pub attempt: u32,
}

impl Submission {
    pub fn first(unit: Arc<Unit>, context: impl Into<Arc<str>>) -> Self {
        Self {
            unit,
            context: context.into(),
            attempt: 1,
        }
    }

    pub fn id(&self) -> &str {
        &self.unit.id
    }

    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Fixed prompt and instruction text shared by every request in a run.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub prompt: Arc<str>,
    pub instruction: Arc<str>,
}

impl RequestTemplate {
    pub fn new(prompt: impl Into<Arc<str>>, instruction: impl Into<Arc<str>>) -> Self {
        Self {
            prompt: prompt.into(),
            instruction: instruction.into(),
        }
    }

    /// Build the request for one attempt: prompt, content and context joined by newlines.
    pub fn render(&self, submission: &Submission) -> Request {
        let mut text = String::with_capacity(
            self.prompt.len() + submission.unit.content.len() + submission.context.len() + 2,
        );
        text.push_str(&self.prompt);
        text.push('\n');
        text.push_str(&submission.unit.content);
        text.push('\n');
        text.push_str(&submission.context);

        Request {
            instruction: Arc::clone(&self.instruction),
            text,
        }
    }
}

/// One call's worth of input to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Sent as the system instruction.
    pub instruction: Arc<str>,
    pub text: String,
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub submission: Submission,
    pub outcome: Result<String, PipelineError>,
    pub tokens: usize,
    pub duration: Duration,
}

impl UnitResult {
    pub fn id(&self) -> &str {
        self.submission.id()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
