//! Configuration sources, lowest priority first: global file, explicit file,
//! environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use tracing::debug;

/// Prefix for environment overrides, e.g. `FOLIO__MODEL`, `FOLIO__RETRY__MAX_ATTEMPTS`.
pub const ENV_PREFIX: &str = "FOLIO";
pub const ENV_SEPARATOR: &str = "__";

/// `config.toml` in the platform config directory (`~/.config/folio` on Linux).
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "folio").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn add_global_file(
    builder: ConfigBuilder<DefaultState>,
    path: Option<&Path>,
) -> ConfigBuilder<DefaultState> {
    match path {
        Some(path) if path.is_file() => {
            debug!(config_path = %path.display(), "Loading global configuration");
            builder.add_source(File::from(path).format(format_for(path)).required(false))
        }
        _ => builder,
    }
}

/// The explicit `--config` file must exist.
pub fn add_explicit_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Message(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    debug!(config_path = %path.display(), "Loading configuration file");
    Ok(builder.add_source(File::from(path).format(format_for(path)).required(true)))
}

/// Environment source. `vars` replaces the process environment when given.
pub fn add_environment(
    builder: ConfigBuilder<DefaultState>,
    vars: Option<HashMap<String, String>>,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(vars),
    )
}

/// JSON for `.json` files, TOML otherwise.
pub fn format_for(path: &Path) -> FileFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    }
}
