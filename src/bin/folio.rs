//! Folio CLI Binary
//!
//! Loads configuration, runs the pipeline over an EPUB or a document
//! directory and prints a summary.

use std::io::IsTerminal;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use folio::cli::{models_table, Cli};
use folio::config::{ConfigLoader, PipelineConfig};
use folio::document::OpenedDocument;
use folio::logging::init_logging;
use folio::provider::ClientFactory;
use folio::report::{summary_line, summary_table, ConsoleReporter, NullReporter, ProgressReporter};
use folio::Pipeline;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::new().with_file(cli.config.as_deref()).load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let logging_config = cli.logging_config(config.logging.clone());
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if cli.list_models {
        println!("{}", models_table(&config.catalog()));
        return;
    }

    info!("Folio starting");
    if let Err(e) = run(&cli, config).await {
        error!("Run failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli, mut config: PipelineConfig) -> anyhow::Result<()> {
    cli.apply_overrides(&mut config);
    let settings = config.resolve().context("invalid configuration")?;

    let client = ClientFactory::create_client(&settings.provider)
        .context("failed to create generation client")?;

    let reporter: Arc<dyn ProgressReporter> = if cli.quiet {
        Arc::new(NullReporter)
    } else {
        Arc::new(ConsoleReporter::new(std::io::stdout().is_terminal()))
    };

    let document = OpenedDocument::open(&settings)
        .with_context(|| format!("cannot open {}", settings.input.display()))?;
    info!(format = ?document.format, input = %settings.input.display(), "Opened document");

    let pipeline = Pipeline::from_settings(&settings, Arc::from(client))
        .with_assembler(Arc::clone(&document.assembler), settings.output_dir.clone())
        .with_reporter(reporter);
    let summary = pipeline
        .run_source(document.source.as_ref())
        .await
        .with_context(|| format!("run over {} failed", settings.input.display()))?;

    if !cli.quiet {
        println!("{}", summary_table(&summary));
        println!("{}", summary_line(&summary));
        if let Some(path) = &summary.assembled {
            println!("Assembled document written to {}", path.display());
        }
    }

    summary.ensure_complete()?;
    Ok(())
}
