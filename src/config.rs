//! The optional `buildrack.toml` configuration file.
//!
//! Every field is optional; command-line flags override whatever is set here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::task::TaskSpec;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "buildrack.toml";

/// Top-level structure of `buildrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum number of output lines kept per task.
    pub max_lines: Option<usize>,
    /// Whether to draw Unicode glyphs (default: true).
    pub symbols: Option<bool>,
    /// Always use plain output, even on a terminal.
    pub no_ui: Option<bool>,
    /// Shell program commands are handed to.
    pub shell: Option<String>,
    /// Arguments placed between the shell and the command (default `-c`).
    pub shell_args: Option<Vec<String>>,
    /// Column width for formatted blocks in plain output.
    pub width: Option<usize>,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

/// One `[[task]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default)]
    pub group: String,
    pub name: String,
    pub cmd: String,
}

impl From<TaskConfig> for TaskSpec {
    fn from(config: TaskConfig) -> Self {
        TaskSpec::new(config.group, config.name, config.cmd)
    }
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// `buildrack.toml` in the working directory, if it exists.
pub fn default_config_path() -> Option<PathBuf> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    path.exists().then(|| path.to_path_buf())
}
