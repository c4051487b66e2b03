//! modkeeper - manage the optional modules of a host application

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use modkeeper_core::{ModularConfig, ModuleManager};

mod module_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "modkeeper",
    about = "Install and manage host application modules",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Configuration file (defaults to ./modkeeper.json, then the global config)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Modules directory, overriding the configuration
    #[clap(long, global = true)]
    modules_path: Option<PathBuf>,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit structured JSON logs on stderr
    #[clap(long, global = true)]
    trace: bool,

    /// Print results as JSON
    #[clap(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// List installed modules
    List,

    /// Enable a module
    Enable {
        /// Module name
        name: String,

        /// Refuse when dependencies are not satisfied
        #[clap(long)]
        strict: bool,
    },

    /// Disable a module
    Disable {
        /// Module name
        name: String,

        /// Disable even when enabled modules depend on it
        #[clap(long)]
        force: bool,
    },

    /// Show unmet dependencies of a module
    Check {
        /// Module name
        name: String,
    },

    /// Look for a dependency cycle starting at a module
    Cycles {
        /// Module name
        name: String,
    },

    /// List enabled modules that depend on a module
    Dependents {
        /// Module name
        name: String,
    },

    /// Install a module package (.tar.gz)
    Install {
        /// Path to the package
        archive: PathBuf,

        /// Install under this name instead of the manifest's
        #[clap(long)]
        name: Option<String>,
    },

    /// Disable a module and delete its directory
    Uninstall {
        /// Module name
        name: String,
    },

    /// Package an installed module into the exports directory
    Export {
        /// Module name
        name: String,
    },

    /// Show enabled modules in boot order
    BootOrder,
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        // Structured output - MUST go to stderr, stdout carries results
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<ModularConfig> {
    let mut config = ModularConfig::load(cli.config.as_deref())?;
    if let Some(modules_path) = &cli.modules_path {
        config.modules_path = modules_path.clone();
    }
    tracing::debug!("Using modules directory {}", config.modules_path.display());
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.trace);

    let config = load_config(&cli)?;
    let manager = ModuleManager::new(config).context("Failed to open module registry")?;

    module_cli::execute(cli.command, &manager, cli.json)
}
