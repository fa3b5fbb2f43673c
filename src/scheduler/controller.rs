//! Retry/completion controller.
//!
//! Consumes results in arrival order, persists successes, schedules backoff
//! re-submissions for failures and finishes once every unit is settled
//! (`Done` or `Failed`). Dropping the controller's input sender is what lets
//! the dispatcher shut down.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use crate::document::UnitSink;
use crate::error::PipelineError;
use crate::pacer::Pacer;
use crate::report::{ProgressEvent, ProgressReporter};
use crate::types::{Submission, UnitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Waiting out a retry backoff.
    Pending,
    /// Handed to the dispatcher; a result is outstanding.
    InFlight,
    Done,
    Failed,
}

impl UnitState {
    pub fn is_settled(self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed)
    }
}

/// What the controller observed over a run.
#[derive(Debug, Clone, Default)]
pub struct ControllerReport {
    /// Succeeded units in completion order.
    pub succeeded: Vec<String>,
    /// Units abandoned after exhausting their attempts.
    pub failed: Vec<(String, PipelineError)>,
    /// Attempts consumed per unit.
    pub attempts: BTreeMap<String, u32>,
}

pub struct Controller {
    input: mpsc::Sender<Submission>,
    results: mpsc::Receiver<UnitResult>,
    sink: Arc<dyn UnitSink>,
    reporter: Arc<dyn ProgressReporter>,
    retry: RetryPolicy,
    pacer: Arc<dyn Pacer>,
}

impl Controller {
    pub fn new(
        input: mpsc::Sender<Submission>,
        results: mpsc::Receiver<UnitResult>,
        sink: Arc<dyn UnitSink>,
        reporter: Arc<dyn ProgressReporter>,
        retry: RetryPolicy,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            input,
            results,
            sink,
            reporter,
            retry,
            pacer,
        }
    }

    /// Submit every unit and drive them to a settled state.
    ///
    /// Returns early only on a fatal error: a failed write or a closed channel.
    pub async fn run(mut self, submissions: Vec<Submission>) -> Result<ControllerReport, PipelineError> {
        let total = submissions.len();
        let mut ledger: HashMap<String, UnitState> = HashMap::with_capacity(total);
        let mut report = ControllerReport::default();
        let mut settled = 0usize;
        let mut backoff: JoinSet<Submission> = JoinSet::new();

        for submission in submissions {
            ledger.insert(submission.id().to_string(), UnitState::InFlight);
            self.reporter.on_event(&ProgressEvent::Queued {
                id: submission.id().to_string(),
            });
            self.submit(submission).await?;
        }

        while settled < total {
            tokio::select! {
                Some(joined) = backoff.join_next(), if !backoff.is_empty() => {
                    let submission = joined.map_err(|e| {
                        PipelineError::Dispatch(format!("backoff task failed: {}", e))
                    })?;
                    debug!(unit = %submission.id(), attempt = submission.attempt, "Re-submitting after backoff");
                    ledger.insert(submission.id().to_string(), UnitState::InFlight);
                    self.submit(submission).await?;
                }
                received = self.results.recv() => {
                    let result = received.ok_or_else(|| {
                        PipelineError::Dispatch(format!(
                            "result channel closed with {} unit(s) outstanding",
                            total - settled
                        ))
                    })?;
                    if ledger.get(result.id()).map_or(true, |s| s.is_settled()) {
                        warn!(unit = %result.id(), "Ignoring result for unknown or settled unit");
                        continue;
                    }
                    let state = self.handle(result, &mut report, &mut backoff)?;
                    if let Some((id, state)) = state {
                        if state.is_settled() {
                            settled += 1;
                        }
                        ledger.insert(id, state);
                    }
                }
            }
        }

        info!(
            total,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "All units settled"
        );
        Ok(report)
    }

    async fn submit(&self, submission: Submission) -> Result<(), PipelineError> {
        self.input
            .send(submission)
            .await
            .map_err(|_| PipelineError::Dispatch("dispatcher input closed".to_string()))
    }

    fn handle(
        &self,
        result: UnitResult,
        report: &mut ControllerReport,
        backoff: &mut JoinSet<Submission>,
    ) -> Result<Option<(String, UnitState)>, PipelineError> {
        let UnitResult {
            submission,
            outcome,
            tokens,
            duration,
        } = result;
        let id = submission.id().to_string();
        let attempt = submission.attempt;
        report.attempts.insert(id.clone(), attempt);

        match outcome {
            Ok(text) => {
                if let Err(err) = self.sink.persist(&id, &text) {
                    error!(unit = %id, error = %err, "Failed to persist response");
                    return Err(err);
                }
                info!(
                    unit = %id,
                    attempt,
                    tokens,
                    duration_ms = duration.as_millis() as u64,
                    "Unit completed"
                );
                self.reporter.on_event(&ProgressEvent::Succeeded {
                    id: id.clone(),
                    attempt,
                    duration,
                });
                report.succeeded.push(id.clone());
                Ok(Some((id, UnitState::Done)))
            }
            Err(err) => {
                warn!(unit = %id, attempt, kind = err.kind(), error = %err, "Attempt failed");
                self.reporter.on_event(&ProgressEvent::Failed {
                    id: id.clone(),
                    attempt,
                    error: err.to_string(),
                });

                if err.is_retryable() && self.retry.allows_retry(attempt) {
                    let delay = self.retry.delay_for_retry(attempt - 1);
                    let next = submission.next_attempt();
                    info!(
                        unit = %id,
                        next_attempt = next.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retry scheduled"
                    );
                    self.reporter.on_event(&ProgressEvent::RetryScheduled {
                        id: id.clone(),
                        next_attempt: next.attempt,
                        delay,
                    });
                    let pacer = Arc::clone(&self.pacer);
                    backoff.spawn(async move {
                        pacer.pause(delay).await;
                        next
                    });
                    Ok(Some((id, UnitState::Pending)))
                } else {
                    let failure = if err.is_retryable() {
                        PipelineError::RetriesExhausted {
                            id: id.clone(),
                            attempts: attempt,
                            last_error: err.to_string(),
                        }
                    } else {
                        err
                    };
                    error!(unit = %id, attempts = attempt, error = %failure, "Unit abandoned");
                    self.reporter.on_event(&ProgressEvent::Abandoned {
                        id: id.clone(),
                        attempts: attempt,
                        error: failure.to_string(),
                    });
                    report.failed.push((id.clone(), failure));
                    Ok(Some((id, UnitState::Failed)))
                }
            }
        }
    }
}
