//! Configuration loading and scratch folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Missing files are not
//! fatal: a warning is logged and compiled defaults are used.
//!
//! Scratch root resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PODMIX_SCRATCH_ROOT`)
//! 3. TOML config file (`scratch_root`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the scratch root
pub const SCRATCH_ROOT_ENV: &str = "PODMIX_SCRATCH_ROOT";

/// Environment variable overriding the music folder
pub const MUSIC_DIR_ENV: &str = "PODMIX_MUSIC_DIR";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Folder holding per-run scratch directories
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Folder holding intro/outro/transition music files
    #[serde(default)]
    pub music_dir: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Raw `[assembly]` table, interpreted by the assembler crate
    #[serde(default)]
    pub assembly: toml::Table,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform config file location (`~/.config/podmix/podmix.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("podmix").join("podmix.toml"))
}

/// Load TOML config from `path`
///
/// A missing file yields defaults with a warning. A file that exists but
/// cannot be parsed is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using built-in defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config: TomlConfig = toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Resolve the scratch root folder
///
/// Priority: CLI argument → `PODMIX_SCRATCH_ROOT` → TOML → compiled default.
pub fn resolve_scratch_root(cli_arg: Option<&Path>, toml_config: Option<&TomlConfig>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(SCRATCH_ROOT_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_config.and_then(|c| c.scratch_root.as_ref()) {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_scratch_root()
}

/// Resolve the music folder, if any is configured
///
/// Priority: CLI argument → `PODMIX_MUSIC_DIR` → TOML. There is no default:
/// a run without a music folder simply has no music.
pub fn resolve_music_dir(cli_arg: Option<&Path>, toml_config: Option<&TomlConfig>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(MUSIC_DIR_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    toml_config.and_then(|c| c.music_dir.clone())
}

/// OS-dependent default scratch root
fn default_scratch_root() -> PathBuf {
    // ~/.cache/podmix/scratch on Linux, ~/Library/Caches/podmix/scratch on macOS,
    // %LOCALAPPDATA%\podmix\scratch on Windows
    dirs::cache_dir()
        .map(|d| d.join("podmix").join("scratch"))
        .unwrap_or_else(|| std::env::temp_dir().join("podmix-scratch"))
}
