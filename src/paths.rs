use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "TRICKPLAY_CONFIG_DIR";

const APP_DIR: &str = "trickplay";
const LOCAL_FILES: [&str; 2] = ["trickplay.json", "trickplay.log"];

/// Where configuration and log files live
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI arg → `TRICKPLAY_CONFIG_DIR` → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration or log file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. TRICKPLAY_CONFIG_DIR environment variable
/// 3. Current directory IF trickplay.json or trickplay.log exists there
/// 4. Platform config directory from dirs-next (~/.config/trickplay on Linux)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Create the config directory if needed.
pub fn ensure_config_dir(config: &PathConfig) -> Result<PathBuf> {
    let dir = config_dir(config);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    Ok(dir)
}

fn has_local_files(dir: &Path) -> bool {
    LOCAL_FILES.iter().any(|f| dir.join(f).exists())
}

fn config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir()
        && has_local_files(&current_dir)
    {
        return current_dir;
    }

    if let Some(dir) = dirs_next::config_dir() {
        return dir.join(APP_DIR);
    }

    PathBuf::from(".")
}
