//! Request cost estimation.
//!
//! Token counts are a heuristic; the estimator is pluggable so a real
//! tokenizer or a different characters-per-token ratio can be swapped in.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::rate::RateBudget;

/// Default characters-per-token ratio.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Maps request text to an estimated token count.
pub trait TokenEstimator: Send + Sync {
    fn estimate_tokens(&self, text: &str) -> usize;
}

/// Byte length divided by a fixed ratio.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / self.chars_per_token
    }
}

/// Estimated cost of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub tokens: usize,
    /// Rate-limit slots the request consumes; always at least 1.
    pub slots: u32,
}

/// Combines a token estimator with a model's rate budget.
#[derive(Clone)]
pub struct CostModel {
    estimator: Arc<dyn TokenEstimator>,
    budget: RateBudget,
}

impl CostModel {
    pub fn new(estimator: Arc<dyn TokenEstimator>, budget: RateBudget) -> Self {
        Self { estimator, budget }
    }

    pub fn with_default_estimator(budget: RateBudget) -> Self {
        Self::new(Arc::new(CharRatioEstimator::default()), budget)
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    /// Token count and slots for `text` without applying the ceiling.
    pub fn measure(&self, text: &str) -> Estimate {
        let tokens = self.estimator.estimate_tokens(text);
        Estimate {
            tokens,
            slots: self.budget.slots_for(tokens),
        }
    }

    /// Estimate `text`, rejecting it when it exceeds the model's token ceiling.
    pub fn estimate(&self, text: &str) -> Result<Estimate, PipelineError> {
        let estimate = self.measure(text);
        if estimate.tokens > self.budget.token_ceiling {
            return Err(PipelineError::OversizedRequest {
                tokens: estimate.tokens,
                ceiling: self.budget.token_ceiling,
            });
        }
        Ok(estimate)
    }
}

impl std::fmt::Debug for CostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostModel")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}
