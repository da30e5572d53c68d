//! Subcommands module for Cloudlab CLI
//!
//! This module contains all the subcommand implementations.

pub mod diff;
pub mod init;
pub mod list;
pub mod plan;
pub mod synth;
pub mod validate;

use crate::cli::output::OutputFormatter;
use anyhow::{Context, Result};
use cloudlab::config::Config;
use cloudlab::stacks::App;
use cloudlab::synth::CloudAssembly;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let use_color = !cli.no_color && config.app.color;
        let output = OutputFormatter::new(use_color, cli.is_json(), cli.verbosity());

        Self { config, output }
    }

    /// Resolve both stacks from the loaded configuration.
    pub fn app(&self) -> Result<App> {
        App::from_config(&self.config).context("failed to resolve stacks from configuration")
    }

    /// Output directory: the explicit one or the configured default.
    pub fn output_dir(&self, explicit: Option<&PathBuf>) -> PathBuf {
        explicit
            .cloned()
            .unwrap_or_else(|| self.config.app.output_dir.clone())
    }
}

/// Load a previously written assembly. A directory without a manifest
/// means nothing was synthesized yet.
pub fn previous_assembly(dir: &Path) -> Result<Option<CloudAssembly>> {
    match CloudAssembly::read(dir) {
        Ok(assembly) => Ok(Some(assembly)),
        Err(cloudlab::Error::FileNotFound(path)) => {
            debug!(path = %path.display(), "no previous assembly");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", dir.display())),
    }
}

/// Trait for runnable commands
#[async_trait::async_trait]
pub trait Runnable {
    /// Execute the command
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32>;
}
