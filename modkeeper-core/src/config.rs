//! Module system configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. An explicit file passed by the caller (`--config`)
//! 2. `./modkeeper.json` - Project-level config
//! 3. `~/.config/modkeeper/config.json` - Global config
//! 4. Built-in defaults
//!
//! `MODKEEPER_MODULES_PATH` overrides `modules_path` from whichever source won.
//!
//! ## On-disk layout
//!
//! ```text
//! <modules_path>/
//! ├── enabled.json          # JSON array of enabled module names
//! ├── Blog/
//! │   └── module.json       # Manifest
//! └── Shop/
//!     └── module.json
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-level config file name, looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "modkeeper.json";

/// Environment variable overriding the modules root
pub const MODULES_PATH_ENV: &str = "MODKEEPER_MODULES_PATH";

/// Top-level module system configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModularConfig {
    /// Root directory holding one subdirectory per module
    #[serde(default = "default_modules_path")]
    pub modules_path: PathBuf,

    /// Serve enabled-set loads through the TTL cache
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Cache lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Enabled-set file name under `modules_path`
    #[serde(default = "default_enabled_modules_file")]
    pub enabled_modules_file: String,

    /// Manifest file name inside each module directory
    #[serde(default = "default_module_config_file")]
    pub module_config_file: String,

    /// Largest accepted package in bytes (0 disables the check)
    #[serde(default = "default_upload_max_size")]
    pub upload_max_size: u64,

    /// Directory receiving exported module archives
    #[serde(default = "default_exports_path")]
    pub exports_path: PathBuf,
}

impl Default for ModularConfig {
    fn default() -> Self {
        Self {
            modules_path: default_modules_path(),
            cache_enabled: default_cache_enabled(),
            cache_ttl: default_cache_ttl(),
            enabled_modules_file: default_enabled_modules_file(),
            module_config_file: default_module_config_file(),
            upload_max_size: default_upload_max_size(),
            exports_path: default_exports_path(),
        }
    }
}

fn default_modules_path() -> PathBuf {
    PathBuf::from("modules")
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_enabled_modules_file() -> String {
    "enabled.json".to_string()
}

fn default_module_config_file() -> String {
    "module.json".to_string()
}

fn default_upload_max_size() -> u64 {
    2048 * 1024
}

fn default_exports_path() -> PathBuf {
    PathBuf::from("storage/modules")
}

impl ModularConfig {
    /// Config rooted at `modules_path`, all other settings default
    pub fn with_modules_path(modules_path: impl Into<PathBuf>) -> Self {
        Self {
            modules_path: modules_path.into(),
            ..Default::default()
        }
    }

    /// Load a config file, failing if it cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Resolve configuration from the standard sources
    ///
    /// An explicit path must exist. The project and global files are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::discover(Path::new(PROJECT_CONFIG_FILE), global_config_path())?,
        };

        if let Ok(path) = std::env::var(MODULES_PATH_ENV) {
            if !path.is_empty() {
                tracing::debug!("{} overrides modules_path: {}", MODULES_PATH_ENV, path);
                config.modules_path = PathBuf::from(path);
            }
        }

        Ok(config)
    }

    fn discover(project: &Path, global: Option<PathBuf>) -> Result<Self> {
        if project.is_file() {
            tracing::debug!("Using project config {}", project.display());
            return Self::load_from_file(project);
        }

        if let Some(global) = global.filter(|p| p.is_file()) {
            tracing::debug!("Using global config {}", global.display());
            return Self::load_from_file(&global);
        }

        Ok(Self::default())
    }

    /// Full path of the enabled-set file
    pub fn enabled_modules_path(&self) -> PathBuf {
        self.modules_path.join(&self.enabled_modules_file)
    }

    /// Cache lifetime as a `Duration`
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

/// Location of the machine-wide config file, if a config directory is known
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "modkeeper", "modkeeper")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .or_else(|| dirs::config_dir().map(|d| d.join("modkeeper")))
        .map(|dir| dir.join("config.json"))
}
