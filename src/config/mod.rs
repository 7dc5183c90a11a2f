pub mod merge;
pub mod schema;

pub use schema::*;

use crate::agents::AgentSource;
use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use crate::exec::RECURSION_GUARD_ENV;
use std::path::{Path, PathBuf};

/// Project config location, relative to the current directory.
pub const PROJECT_CONFIG_PATH: &str = ".delegate/delegate.toml";

/// Load configuration by merging global, project, and CLI sources.
/// Precedence: CLI > project config > global config > defaults.
///
/// Missing discovered config files are handled gracefully (defaults apply);
/// a file named with `--config` must exist and parse.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/delegate/delegate.toml or platform equivalent)
    let global = load_global_config();

    // Layer 2: Project config (explicit --config, else ./.delegate/delegate.toml)
    let project = match &cli.config {
        Some(path) => load_toml_file(path, AgentSource::Project)?.ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            ))
        })?,
        None => discovered(Path::new(PROJECT_CONFIG_PATH), AgentSource::Project),
    };

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    // Merge: CLI > project > global > defaults
    let mut config = cli_partial
        .with_fallback(project)
        .with_fallback(global)
        .finalize();

    config.runner.recursion_blocked = std::env::var_os(RECURSION_GUARD_ENV).is_some();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => discovered(&p, AgentSource::User),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load an optional config file, logging and ignoring any problem with it.
fn discovered(path: &Path, source: AgentSource) -> PartialConfig {
    match load_toml_file(path, source) {
        Ok(partial) => partial.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Ignoring config at {}: {}", path.display(), e);
            PartialConfig::default()
        }
    }
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_file(path: &Path, source: AgentSource) -> Result<Option<PartialConfig>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let config_file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let partial = config_file.to_partial(source)?;
    tracing::info!(agents = partial.agents.len(), "Loaded config from {}", path.display());
    Ok(Some(partial))
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/delegate/delegate.toml
/// macOS: ~/Library/Application Support/delegate/delegate.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "delegate")
        .map(|dirs| dirs.config_dir().join("delegate.toml"))
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Run {
            cwd,
            max_concurrency,
            artifacts,
            ..
        } => PartialConfig {
            max_concurrency: *max_concurrency,
            artifact_dir: artifacts.clone(),
            default_working_dir: cwd.clone(),
            ..Default::default()
        },
        Commands::Agents => PartialConfig::default(),
    }
}
