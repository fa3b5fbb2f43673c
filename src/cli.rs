//! CLI: clap types and the mapping from flags onto configuration.

use std::path::PathBuf;

use clap::Parser;
use comfy_table::Table;

use crate::config::PipelineConfig;
use crate::logging::LoggingConfig;
use crate::rate::ModelCatalog;

const AFTER_HELP: &str = "\
Arguments can also come from a JSON or TOML file passed with -j:
  {
    \"file\": \"book.epub\",
    \"directory\": \"output\",
    \"contextBefore\": 1,
    \"contextAfter\": 1,
    \"APIKey\": \"...\",
    \"prompt\": \"Translate this chapter into English\",
    \"instruction\": \"Keep all markup intact\",
    \"model\": \"gemini-1.5-flash\"
  }
Flags given on the command line override values from the file.";

/// Folio - transform a document chapter by chapter through a rate-limited LLM
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// EPUB file or document directory to read units from
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Output directory for per-unit results
    #[arg(short = 'd', long = "directory")]
    pub directory: Option<PathBuf>,

    /// Number of preceding units supplied as context
    #[arg(long = "cb")]
    pub context_before: Option<usize>,

    /// Number of following units supplied as context
    #[arg(long = "ca")]
    pub context_after: Option<usize>,

    /// API key for the generation service
    #[arg(long)]
    pub key: Option<String>,

    /// Prompt sent ahead of each unit
    #[arg(long)]
    pub prompt: Option<String>,

    /// System instruction for the model
    #[arg(long)]
    pub instruction: Option<String>,

    /// Model name (selects the rate budget)
    #[arg(long)]
    pub model: Option<String>,

    /// Configuration or arguments file (TOML or JSON)
    #[arg(short = 'j', long = "config")]
    pub config: Option<PathBuf>,

    /// Attempts per unit before it is abandoned
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Path of the assembled output document
    #[arg(long)]
    pub assembled: Option<PathBuf>,

    /// File name substring that marks a unit (case-insensitive)
    #[arg(long)]
    pub pattern: Option<String>,

    /// Print the known models and their rates, then exit
    #[arg(long, default_value = "false")]
    pub list_models: bool,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging and progress notices
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Overlay every flag that was given onto `config`.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(file) = &self.file {
            config.input = Some(file.clone());
        }
        if let Some(directory) = &self.directory {
            config.output_dir = directory.clone();
        }
        if let Some(before) = self.context_before {
            config.context_before = before;
        }
        if let Some(after) = self.context_after {
            config.context_after = after;
        }
        if let Some(key) = &self.key {
            config.api_key = Some(key.clone());
        }
        if let Some(prompt) = &self.prompt {
            config.prompt = Some(prompt.clone());
        }
        if let Some(instruction) = &self.instruction {
            config.instruction = Some(instruction.clone());
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(assembled) = &self.assembled {
            config.assembled = Some(assembled.clone());
        }
        if let Some(pattern) = &self.pattern {
            config.unit_pattern = pattern.clone();
        }
    }

    /// Logging configuration with CLI flags applied over `base`.
    pub fn logging_config(&self, base: LoggingConfig) -> LoggingConfig {
        let mut config = base;

        if self.quiet {
            config.level = "off".to_string();
        }
        if self.verbose {
            config.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = file.clone();
            if self.log_output.is_none() {
                config.output = "file".to_string();
            }
        }

        config
    }
}

/// Known models as a table.
pub fn models_table(catalog: &ModelCatalog) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Model", "Slot", "Token ceiling"]);
    for name in catalog.names() {
        if let Ok(budget) = catalog.resolve(name) {
            table.add_row(vec![
                name.to_string(),
                format!("{:.1}s", budget.slot_duration.as_secs_f64()),
                budget.token_ceiling.to_string(),
            ]);
        }
    }
    table
}
