//! End-to-end run: unit set construction, dispatch, retry control and
//! assembly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::RunSettings;
use crate::context::build_context;
use crate::cost::{CharRatioEstimator, CostModel, TokenEstimator};
use crate::document::{Assembler, ConcatAssembler, DirectorySink, DocumentSource, UnitSink};
use crate::error::PipelineError;
use crate::pacer::{Pacer, TokioPacer};
use crate::provider::GenerationClient;
use crate::rate::RateBudget;
use crate::report::{NullReporter, ProgressReporter};
use crate::scheduler::{self, Controller, Dispatcher, Executor, RetryPolicy};
use crate::types::{RequestTemplate, Submission, UnitSet};

/// Outcome of a run that was not aborted by a fatal error.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    /// Units whose output already existed.
    pub skipped: Vec<String>,
    /// Units completed this run, in completion order.
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, PipelineError)>,
    pub attempts: BTreeMap<String, u32>,
    /// Attempts the dispatcher processed, including rejected ones.
    pub dispatch_attempts: usize,
    pub paced: Duration,
    pub assembled: Option<PathBuf>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Incomplete` naming every failed unit, if any.
    pub fn ensure_complete(&self) -> Result<(), PipelineError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(PipelineError::Incomplete(
                self.failed.iter().map(|(id, _)| id.clone()).collect(),
            ))
        }
    }
}

/// Tunables that are not collaborators.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub budget: RateBudget,
    pub template: RequestTemplate,
    pub context_before: usize,
    pub context_after: usize,
    pub retry: RetryPolicy,
    pub result_capacity: usize,
}

impl PipelineOptions {
    pub fn new(budget: RateBudget, template: RequestTemplate) -> Self {
        Self {
            budget,
            template,
            context_before: 0,
            context_after: 0,
            retry: RetryPolicy::default(),
            result_capacity: scheduler::DEFAULT_OUTPUT_CAPACITY,
        }
    }

    pub fn with_context(mut self, before: usize, after: usize) -> Self {
        self.context_before = before;
        self.context_after = after;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

pub struct Pipeline {
    options: PipelineOptions,
    client: Arc<dyn GenerationClient>,
    sink: Arc<dyn UnitSink>,
    assembler: Option<(Arc<dyn Assembler>, PathBuf)>,
    reporter: Arc<dyn ProgressReporter>,
    pacer: Arc<dyn Pacer>,
    estimator: Arc<dyn TokenEstimator>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        client: Arc<dyn GenerationClient>,
        sink: Arc<dyn UnitSink>,
    ) -> Self {
        Self {
            options,
            client,
            sink,
            assembler: None,
            reporter: Arc::new(NullReporter),
            pacer: Arc::new(TokioPacer),
            estimator: Arc::new(CharRatioEstimator::default()),
        }
    }

    /// Pipeline writing to the configured output directory and concatenating
    /// into the configured target; EPUB runs swap in their own assembler.
    pub fn from_settings(settings: &RunSettings, client: Arc<dyn GenerationClient>) -> Self {
        let options = PipelineOptions {
            budget: settings.budget,
            template: RequestTemplate::new(settings.prompt.as_str(), settings.instruction.as_str()),
            context_before: settings.context_before,
            context_after: settings.context_after,
            retry: settings.retry.clone(),
            result_capacity: settings.result_queue_capacity,
        };
        Self::new(
            options,
            client,
            Arc::new(DirectorySink::new(&settings.output_dir)),
        )
        .with_assembler(
            Arc::new(ConcatAssembler::new(&settings.assembled)),
            settings.output_dir.clone(),
        )
        .with_estimator(Arc::new(CharRatioEstimator::new(settings.chars_per_token)))
    }

    /// Assemble from `output_dir` once every unit is done.
    pub fn with_assembler(mut self, assembler: Arc<dyn Assembler>, output_dir: PathBuf) -> Self {
        self.assembler = Some((assembler, output_dir));
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Load units from `source` and run them.
    pub async fn run_source(&self, source: &dyn DocumentSource) -> Result<RunSummary, PipelineError> {
        let units = UnitSet::from_entries(source.load()?)?;
        self.run(&units).await
    }

    /// Drive every pending unit to `Done` or `Failed`.
    ///
    /// Fatal errors (persistence, dispatch, assembly) abort the run. Units
    /// that exhaust their attempts are reported in the summary and skip
    /// assembly; [`RunSummary::ensure_complete`] turns that into `Incomplete`.
    pub async fn run(&self, units: &UnitSet) -> Result<RunSummary, PipelineError> {
        let submissions = self.submissions(units);
        let skipped: Vec<String> = units
            .iter()
            .filter(|u| units.is_processed(u.ordinal))
            .map(|u| u.id.clone())
            .collect();

        info!(
            total = units.len(),
            pending = submissions.len(),
            skipped = skipped.len(),
            model = self.client.model_name(),
            "Starting run"
        );

        self.sink.prepare()?;

        let mut summary = RunSummary {
            total: units.len(),
            skipped,
            ..Default::default()
        };

        if !submissions.is_empty() {
            let (input_tx, input_rx) =
                mpsc::channel(scheduler::input_capacity(submissions.len()));
            let (output_tx, output_rx) = mpsc::channel(self.options.result_capacity.max(1));

            let dispatcher = Dispatcher::new(
                input_rx,
                output_tx,
                Executor::new(Arc::clone(&self.client)),
                CostModel::new(Arc::clone(&self.estimator), self.options.budget),
                self.options.template.clone(),
                Arc::clone(&self.pacer),
            );
            let dispatch = tokio::spawn(dispatcher.run());

            let controller = Controller::new(
                input_tx,
                output_rx,
                Arc::clone(&self.sink),
                Arc::clone(&self.reporter),
                self.options.retry.clone(),
                Arc::clone(&self.pacer),
            );

            let report = match controller.run(submissions).await {
                Ok(report) => report,
                Err(err) => {
                    dispatch.abort();
                    return Err(err);
                }
            };

            let stats = dispatch
                .await
                .map_err(|e| PipelineError::Dispatch(format!("dispatcher task failed: {}", e)))??;

            summary.succeeded = report.succeeded;
            summary.failed = report.failed;
            summary.attempts = report.attempts;
            summary.dispatch_attempts = stats.attempts();
            summary.paced = stats.paced;
        }

        if summary.is_complete() {
            if let Some((assembler, output_dir)) = &self.assembler {
                let order = units.ids();
                summary.assembled = Some(assembler.assemble(output_dir, &order)?);
            }
        } else {
            warn!(
                failed = summary.failed.len(),
                "Skipping assembly; some units failed"
            );
        }

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            dispatch_attempts = summary.dispatch_attempts,
            "Run finished"
        );
        Ok(summary)
    }

    /// Context is derived by pure lookups into the already-built set.
    fn submissions(&self, units: &UnitSet) -> Vec<Submission> {
        let contents = units.contents();
        units
            .pending()
            .map(|unit| {
                let context = build_context(
                    &contents,
                    unit.ordinal,
                    self.options.context_before,
                    self.options.context_after,
                );
                Submission::first(Arc::clone(unit), context)
            })
            .collect()
    }
}
