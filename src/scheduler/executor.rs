//! Request executor: one service call per launched attempt.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::provider::GenerationClient;
use crate::types::{Request, Submission, UnitResult};

#[derive(Clone)]
pub struct Executor {
    client: Arc<dyn GenerationClient>,
}

impl Executor {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    /// Call the service once and wrap the outcome with its elapsed time.
    pub async fn execute(&self, submission: Submission, request: Request, tokens: usize) -> UnitResult {
        let started = Instant::now();
        debug!(
            unit = %submission.id(),
            attempt = submission.attempt,
            tokens,
            model = self.client.model_name(),
            "Sending generation request"
        );

        let outcome = self.client.generate(&request).await;
        let duration = started.elapsed();

        info!(
            unit = %submission.id(),
            attempt = submission.attempt,
            duration_ms = duration.as_millis() as u64,
            success = outcome.is_ok(),
            "Provider response received"
        );

        UnitResult {
            submission,
            outcome,
            tokens,
            duration,
        }
    }

    /// Execute and deliver exactly one result to `output`.
    pub async fn execute_into(
        self,
        submission: Submission,
        request: Request,
        tokens: usize,
        output: mpsc::Sender<UnitResult>,
    ) {
        let result = self.execute(submission, request, tokens).await;
        let id = result.id().to_string();
        if output.send(result).await.is_err() {
            debug!(unit = %id, "Result receiver dropped; discarding result");
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("provider", &self.client.provider_name())
            .field("model", &self.client.model_name())
            .finish()
    }
}
