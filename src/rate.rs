//! Per-model rate budgets.
//!
//! A [`RateBudget`] is resolved once from the [`ModelCatalog`] during
//! configuration and handed to the dispatcher by value.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Default maximum tokens per request.
pub const DEFAULT_TOKEN_CEILING: usize = 1_000_000;

/// Nominal requests per quota window that a ceiling-sized budget is split into.
pub const DEFAULT_SLOTS_PER_WINDOW: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    /// Minimum spacing between one slot of quota and the next.
    pub slot_duration: Duration,
    pub token_ceiling: usize,
    pub slots_per_window: usize,
}

impl RateBudget {
    pub fn new(slot_duration: Duration, token_ceiling: usize) -> Self {
        Self {
            slot_duration,
            token_ceiling,
            slots_per_window: DEFAULT_SLOTS_PER_WINDOW,
        }
    }

    pub fn from_requests_per_minute(rpm: u32, token_ceiling: usize) -> Self {
        let rpm = rpm.max(1);
        Self::new(Duration::from_millis(60_000 / u64::from(rpm)), token_ceiling)
    }

    /// Slots a request of `tokens` consumes; never less than one.
    ///
    /// A ceiling-sized request costs exactly `slots_per_window` slots.
    pub fn slots_for(&self, tokens: usize) -> u32 {
        let ceiling = self.token_ceiling.max(1) as u128;
        let scaled = tokens as u128 * self.slots_per_window.max(1) as u128;
        let slots = scaled.div_ceil(ceiling).max(1);
        u32::try_from(slots).unwrap_or(u32::MAX)
    }

    /// Launch spacing owed after dispatching a request of `slots`.
    pub fn spacing(&self, slots: u32) -> Duration {
        self.slot_duration.saturating_mul(slots)
    }
}

/// Rate entry for one model as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRate {
    pub requests_per_minute: u32,
    #[serde(default)]
    pub token_ceiling: Option<usize>,
}

impl ModelRate {
    pub fn budget(&self) -> RateBudget {
        RateBudget::from_requests_per_minute(
            self.requests_per_minute,
            self.token_ceiling.unwrap_or(DEFAULT_TOKEN_CEILING),
        )
    }
}

/// Known models and their rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelRate>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        for (name, rpm) in [
            ("gemini-1.5-pro", 15),
            ("gemini-1.5-flash", 15),
            ("gemini-1.5-flash-8b", 2),
        ] {
            models.insert(
                name.to_string(),
                ModelRate {
                    requests_per_minute: rpm,
                    token_ceiling: None,
                },
            );
        }
        Self { models }
    }
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Built-in catalog with configured entries added or overriding.
    pub fn with_overrides(overrides: &BTreeMap<String, ModelRate>) -> Self {
        let mut catalog = Self::default();
        for (name, rate) in overrides {
            catalog.insert(name.clone(), *rate);
        }
        catalog
    }

    pub fn insert(&mut self, name: impl Into<String>, rate: ModelRate) {
        self.models.insert(name.into(), rate);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Result<RateBudget, PipelineError> {
        self.models
            .get(name)
            .map(ModelRate::budget)
            .ok_or_else(|| {
                let known: Vec<&str> = self.names().collect();
                PipelineError::ConfigError(format!(
                    "unknown model '{}' (known: {})",
                    name,
                    known.join(", ")
                ))
            })
    }
}
