//! Shared fixtures: a scripted generation client and unit builders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio::error::PipelineError;
use folio::provider::GenerationClient;
use folio::rate::RateBudget;
use folio::{Request, RequestTemplate, SourceEntry, UnitSet};
use parking_lot::Mutex;

pub const PROMPT: &str = "PROMPT";
pub const INSTRUCTION: &str = "INSTRUCTION";

/// Deterministic stub service.
///
/// Identifies units by the content line of the request, fails a unit a
/// scripted number of times, then answers `done:<content>:<attempt>`.
#[derive(Default)]
pub struct ScriptedClient {
    failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<Request>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, content: &str, times: u32) -> Self {
        self.failures.get_mut().insert(content.to_string(), times);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, content: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| content_of(r) == content)
            .count()
    }
}

/// The unit content line of a rendered request.
pub fn content_of(request: &Request) -> &str {
    request.text.split('\n').nth(1).unwrap_or_default()
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &Request) -> Result<String, PipelineError> {
        self.calls.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = content_of(request).to_string();
        let attempt = {
            let mut attempts = self.attempts.lock();
            let n = attempts.entry(content.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&content) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PipelineError::Service(format!("HTTP 503 for {}", content)));
            }
        }
        Ok(format!("done:{}:{}", content, attempt))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-1"
    }
}

pub fn template() -> RequestTemplate {
    RequestTemplate::new(PROMPT, INSTRUCTION)
}

pub fn budget() -> RateBudget {
    RateBudget::new(Duration::from_secs(4), 1_000_000)
}

/// Units `chapterN.xhtml` with the given single-line contents.
pub fn unit_set(contents: &[&str]) -> UnitSet {
    let entries = contents
        .iter()
        .enumerate()
        .map(|(i, c)| SourceEntry::new(format!("chapter{}.xhtml", i + 1), *c))
        .collect();
    UnitSet::from_entries(entries).unwrap()
}

pub fn client(client: ScriptedClient) -> (Arc<ScriptedClient>, Arc<dyn GenerationClient>) {
    let concrete = Arc::new(client);
    let shared: Arc<dyn GenerationClient> = concrete.clone();
    (concrete, shared)
}
