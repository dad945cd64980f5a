//! Command-line interface for the gadget container.
//!
//! The `gadgetc` binary drives the same [`RequestHandler`] a server would,
//! which makes it handy for checking a deployment directory before serving
//! it and for debugging a single gadget.
//!
//! # Available Commands
//!
//! - `render` - Render a gadget and print the document
//! - `metadata` - Print gadget metadata as JSON
//! - `resolve` - Show the dependency order of a feature
//! - `env` - Print a container's environment-init script
//! - `js` - Print the gadget-side JavaScript of a feature
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug logging
//! - `--quiet` - Only log errors
//! - `--config` - Path to the server configuration (default `gadgets.toml`)
//!
//! `RUST_LOG` overrides the level chosen by `--verbose`/`--quiet`.
//!
//! # Example
//!
//! ```bash
//! gadgetc render http://example.com/gadget.xml --view canvas --pref color=red
//! gadgetc resolve dynamic-height --container default
//! gadgetc metadata http://example.com/a.xml http://example.com/b.xml
//! ```
//!
//! [`RequestHandler`]: crate::handler::RequestHandler

pub mod common;
mod env;
mod metadata;
mod render;
mod resolve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gadgets.toml";

/// Runtime configuration derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level for the subscriber; `None` logs errors only.
    pub log_level: Option<String>,

    /// Server configuration file.
    pub config_path: PathBuf,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber, writing to stderr so command
    /// output on stdout stays clean.
    ///
    /// `RUST_LOG` wins over the configured level. Calling this twice is a
    /// no-op.
    pub fn init_logging(&self) {
        let level = self.log_level.as_deref().unwrap_or("error");
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Main CLI structure.
#[derive(Parser)]
#[command(
    name = "gadgetc",
    about = "Gadget container - resolve features and render gadgets",
    version,
    long_about = "Loads the containers named by a server configuration and renders gadget manifests through the six-stage gadget pipeline."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the server configuration file
    #[arg(short, long, global = true, env = "GADGETS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a gadget through the gadget pipeline
    Render(render::RenderCommand),

    /// Print metadata for one or more gadgets
    Metadata(metadata::MetadataCommand),

    /// Show the dependency order of a feature
    Resolve(resolve::ResolveCommand),

    /// Print a container's environment-init script
    Env(env::EnvCommand),

    /// Print the gadget-side JavaScript of a feature and its dependencies
    Js(env::JsCommand),
}

impl Cli {
    /// Execute the selected command.
    ///
    /// # Errors
    ///
    /// Returns the command's error; `main` turns it into a user-friendly
    /// message and a non-zero exit status.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Build the runtime configuration from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Render(cmd) => cmd.execute(&config.config_path).await,
            Commands::Metadata(cmd) => cmd.execute(&config.config_path).await,
            Commands::Resolve(cmd) => cmd.execute(&config.config_path).await,
            Commands::Env(cmd) => cmd.execute(&config.config_path).await,
            Commands::Js(cmd) => cmd.execute(&config.config_path).await,
        }
    }
}
