//! Rate-limited dispatcher.
//!
//! Throttles the *launch* rate of attempts: after each launch the loop pauses
//! for `slot_duration * slots` before taking the next submission. Execution
//! itself is concurrent; every launched attempt runs in a supervised task that
//! is joined before the output channel closes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use super::executor::Executor;
use crate::cost::CostModel;
use crate::error::PipelineError;
use crate::pacer::Pacer;
use crate::types::{RequestTemplate, Submission, UnitResult};

/// Dispatch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Attempts handed to the executor.
    pub launched: usize,
    /// Attempts refused for exceeding the token ceiling.
    pub rejected: usize,
    /// Launch spacing owed across the run.
    pub paced: Duration,
}

impl DispatchStats {
    /// Every attempt the dispatcher processed, sent or not.
    pub fn attempts(&self) -> usize {
        self.launched + self.rejected
    }
}

pub struct Dispatcher {
    input: mpsc::Receiver<Submission>,
    output: mpsc::Sender<UnitResult>,
    executor: Executor,
    cost: CostModel,
    template: RequestTemplate,
    pacer: Arc<dyn Pacer>,
    stats: Arc<RwLock<DispatchStats>>,
}

impl Dispatcher {
    pub fn new(
        input: mpsc::Receiver<Submission>,
        output: mpsc::Sender<UnitResult>,
        executor: Executor,
        cost: CostModel,
        template: RequestTemplate,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            input,
            output,
            executor,
            cost,
            template,
            pacer,
            stats: Arc::new(RwLock::new(DispatchStats::default())),
        }
    }

    /// Shared handle on the live counters.
    pub fn stats_handle(&self) -> Arc<RwLock<DispatchStats>> {
        Arc::clone(&self.stats)
    }

    /// Run until the input channel is closed and drained.
    ///
    /// In-flight attempts are joined before returning, so every launched
    /// attempt's result is on the output channel once this resolves.
    pub async fn run(mut self) -> Result<DispatchStats, PipelineError> {
        let mut in_flight: JoinSet<()> = JoinSet::new();

        while let Some(submission) = self.input.recv().await {
            while let Some(joined) = in_flight.try_join_next() {
                joined.map_err(task_failure)?;
            }

            let request = self.template.render(&submission);
            match self.cost.estimate(&request.text) {
                Err(err) => {
                    let tokens = match &err {
                        PipelineError::OversizedRequest { tokens, .. } => *tokens,
                        _ => self.cost.measure(&request.text).tokens,
                    };
                    warn!(
                        unit = %submission.id(),
                        attempt = submission.attempt,
                        tokens,
                        ceiling = self.cost.budget().token_ceiling,
                        "Rejecting oversized request without dispatch"
                    );
                    self.stats.write().rejected += 1;

                    let result = UnitResult {
                        submission,
                        outcome: Err(err),
                        tokens,
                        duration: Duration::ZERO,
                    };
                    self.output.send(result).await.map_err(|_| {
                        PipelineError::Dispatch("result channel closed".to_string())
                    })?;
                }
                Ok(estimate) => {
                    let spacing = self.cost.budget().spacing(estimate.slots);
                    info!(
                        unit = %submission.id(),
                        attempt = submission.attempt,
                        tokens = estimate.tokens,
                        slots = estimate.slots,
                        spacing_ms = spacing.as_millis() as u64,
                        "Launching request"
                    );

                    in_flight.spawn(self.executor.clone().execute_into(
                        submission,
                        request,
                        estimate.tokens,
                        self.output.clone(),
                    ));

                    {
                        let mut stats = self.stats.write();
                        stats.launched += 1;
                        stats.paced += spacing;
                    }
                    self.pacer.pause(spacing).await;
                }
            }
        }

        debug!(in_flight = in_flight.len(), "Input closed; draining in-flight requests");
        while let Some(joined) = in_flight.join_next().await {
            joined.map_err(task_failure)?;
        }
        drop(self.output);

        let stats = self.stats.read().clone();
        info!(
            launched = stats.launched,
            rejected = stats.rejected,
            paced_ms = stats.paced.as_millis() as u64,
            "Dispatcher stopped"
        );
        Ok(stats)
    }
}

fn task_failure(err: JoinError) -> PipelineError {
    PipelineError::Dispatch(format!("request task failed: {}", err))
}
