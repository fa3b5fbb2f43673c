//! Configuration System
//!
//! Layered configuration for a run: built-in defaults, the global
//! `config.toml`, an explicit `--config` file (TOML, or the JSON arguments
//! file), `FOLIO__*` environment variables and finally CLI flags. Validation
//! reports every problem at once and resolves the model's rate budget before
//! any unit is loaded.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::InputFormat;
use crate::error::PipelineError;
use crate::logging::LoggingConfig;
use crate::provider::{ProviderKind, ProviderSettings};
use crate::rate::{ModelCatalog, ModelRate, RateBudget};
use crate::scheduler::RetryPolicy;

pub mod sources;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Extracted document directory.
    #[serde(default, alias = "file")]
    pub input: Option<PathBuf>,

    #[serde(default = "default_output_dir", alias = "directory")]
    pub output_dir: PathBuf,

    #[serde(default, alias = "contextBefore", alias = "contextbefore")]
    pub context_before: usize,

    #[serde(default, alias = "contextAfter", alias = "contextafter")]
    pub context_after: usize,

    #[serde(default, alias = "APIKey", alias = "apikey", alias = "key")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(default)]
    pub instruction: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub provider: ProviderKind,

    /// Service endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Case-insensitive file name substring that marks a unit.
    #[serde(default = "default_unit_pattern")]
    pub unit_pattern: String,

    /// Where the assembled document is written; defaults to `<output_dir>.epub`
    /// for EPUB inputs and `<output_dir>.assembled` otherwise.
    #[serde(default)]
    pub assembled: Option<PathBuf>,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    #[serde(default = "default_result_capacity")]
    pub result_queue_capacity: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Extra or overriding model rates.
    #[serde(default)]
    pub models: BTreeMap<String, ModelRate>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_unit_pattern() -> String {
    crate::document::DEFAULT_UNIT_PATTERN.to_string()
}

fn default_chars_per_token() -> usize {
    crate::cost::DEFAULT_CHARS_PER_TOKEN
}

fn default_result_capacity() -> usize {
    crate::scheduler::DEFAULT_OUTPUT_CAPACITY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: None,
            output_dir: default_output_dir(),
            context_before: 0,
            context_after: 0,
            api_key: None,
            prompt: None,
            instruction: None,
            model: None,
            provider: ProviderKind::default(),
            base_url: None,
            unit_pattern: default_unit_pattern(),
            assembled: None,
            chars_per_token: default_chars_per_token(),
            result_queue_capacity: default_result_capacity(),
            retry: RetryConfig::default(),
            models: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Retry settings as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Missing(&'static str),
    Invalid(&'static str, String),
    UnknownModel { model: String, known: Vec<String> },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Missing(field) => write!(f, "'{}' is required", field),
            ValidationError::Invalid(field, msg) => write!(f, "'{}': {}", field, msg),
            ValidationError::UnknownModel { model, known } => write!(
                f,
                "model '{}' is not a valid model (known: {})",
                model,
                known.join(", ")
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Everything a run needs, resolved and checked.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub input: PathBuf,
    pub format: InputFormat,
    pub output_dir: PathBuf,
    pub assembled: PathBuf,
    pub context_before: usize,
    pub context_after: usize,
    pub prompt: String,
    pub instruction: String,
    pub unit_pattern: String,
    pub provider: ProviderSettings,
    pub budget: RateBudget,
    pub chars_per_token: usize,
    pub result_queue_capacity: usize,
    pub retry: RetryPolicy,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl PipelineConfig {
    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::with_overrides(&self.models)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.input.is_none() {
            errors.push(ValidationError::Missing("file"));
        }
        if present(&self.api_key).is_none() {
            errors.push(ValidationError::Missing("key"));
        }
        if present(&self.prompt).is_none() {
            errors.push(ValidationError::Missing("prompt"));
        }
        if present(&self.instruction).is_none() {
            errors.push(ValidationError::Missing("instruction"));
        }
        match present(&self.model) {
            None => errors.push(ValidationError::Missing("model")),
            Some(model) => {
                let catalog = self.catalog();
                if !catalog.contains(model) {
                    errors.push(ValidationError::UnknownModel {
                        model: model.to_string(),
                        known: catalog.names().map(str::to_string).collect(),
                    });
                }
            }
        }

        if self.output_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Invalid(
                "directory",
                "output directory cannot be empty".to_string(),
            ));
        }
        if self.unit_pattern.is_empty() {
            errors.push(ValidationError::Invalid(
                "unit_pattern",
                "pattern cannot be empty".to_string(),
            ));
        }
        if self.chars_per_token == 0 {
            errors.push(ValidationError::Invalid(
                "chars_per_token",
                "must be at least 1".to_string(),
            ));
        }
        if self.result_queue_capacity == 0 {
            errors.push(ValidationError::Invalid(
                "result_queue_capacity",
                "must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            errors.push(ValidationError::Invalid(
                "retry.max_attempts",
                "must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            errors.push(ValidationError::Invalid(
                "retry.multiplier",
                "must be a finite number >= 1.0".to_string(),
            ));
        }
        for (name, rate) in &self.models {
            if rate.requests_per_minute == 0 {
                errors.push(ValidationError::Invalid(
                    "models",
                    format!("'{}' requests_per_minute must be at least 1", name),
                ));
            }
            if rate.token_ceiling == Some(0) {
                errors.push(ValidationError::Invalid(
                    "models",
                    format!("'{}' token_ceiling must be at least 1", name),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and resolve into run settings.
    pub fn resolve(&self) -> Result<RunSettings, PipelineError> {
        self.validate().map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(joined.join("; "))
        })?;

        let missing = |field: &str| PipelineError::ConfigError(format!("'{}' is required", field));
        let input = self.input.clone().ok_or_else(|| missing("file"))?;
        let model = present(&self.model).ok_or_else(|| missing("model"))?;
        let budget = self.catalog().resolve(model)?;

        let format = InputFormat::detect(&input);
        let assembled = self.assembled.clone().unwrap_or_else(|| {
            let mut name = self.output_dir.as_os_str().to_os_string();
            name.push(if format.assembles_epub() {
                ".epub"
            } else {
                ".assembled"
            });
            PathBuf::from(name)
        });

        Ok(RunSettings {
            input,
            format,
            output_dir: self.output_dir.clone(),
            assembled,
            context_before: self.context_before,
            context_after: self.context_after,
            prompt: present(&self.prompt).unwrap_or_default().to_string(),
            instruction: present(&self.instruction).unwrap_or_default().to_string(),
            unit_pattern: self.unit_pattern.clone(),
            provider: ProviderSettings {
                kind: self.provider,
                model: model.to_string(),
                api_key: present(&self.api_key).unwrap_or_default().to_string(),
                base_url: self.base_url.clone(),
            },
            budget,
            chars_per_token: self.chars_per_token,
            result_queue_capacity: self.result_queue_capacity,
            retry: self.retry.policy(),
        })
    }
}

/// Builds a [`PipelineConfig`] from the layered sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    global: Option<PathBuf>,
    explicit: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    skip_global: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of the platform global config location.
    pub fn with_global_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.global = Some(path.into());
        self
    }

    pub fn without_global_file(mut self) -> Self {
        self.skip_global = true;
        self
    }

    pub fn with_file(mut self, path: Option<&Path>) -> Self {
        self.explicit = path.map(Path::to_path_buf);
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn load(&self) -> Result<PipelineConfig, PipelineError> {
        let mut builder = config::Config::builder();

        if !self.skip_global {
            let global = self.global.clone().or_else(sources::global_config_path);
            builder = sources::add_global_file(builder, global.as_deref());
        }
        if let Some(path) = &self.explicit {
            builder = sources::add_explicit_file(builder, path)?;
        }
        builder = sources::add_environment(builder, self.env.clone());

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
