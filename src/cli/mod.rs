//! CLI module for Cloudlab
//!
//! This module provides the command-line interface for Cloudlab,
//! including argument parsing and subcommand dispatch.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cloudlab - network and web-server stacks as code
///
/// Synthesizes a VPC stack and a web-server stack into CloudFormation
/// templates, diffs them against earlier output and predicts deployments.
#[derive(Parser, Debug, Clone)]
#[command(name = "cloudlab")]
#[command(author = "Cloudlab Contributors")]
#[command(version)]
#[command(about = "Network and web-server stacks as code", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long = "output-format", global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "CLOUDLAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Deployment region (overrides configuration)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Deployment account (overrides configuration)
    #[arg(long, global = true)]
    pub account: Option<String>,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Synthesize the stacks into a cloud assembly
    Synth(commands::synth::SynthArgs),

    /// Compare the stacks with a previously synthesized assembly
    Diff(commands::diff::DiffArgs),

    /// Predict what a deployment would do
    Plan(commands::plan::PlanArgs),

    /// List stacks
    List(commands::list::ListArgs),

    /// Check the structural invariants of the stacks
    Validate(commands::validate::ValidateArgs),

    /// Write a starter configuration file
    Init(commands::init::InitArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output_format, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["cloudlab", "synth"]).unwrap();
        assert!(matches!(cli.command, Commands::Synth(_)));
        assert!(!cli.is_json());
    }

    #[test]
    fn test_verbosity_is_capped() {
        let cli = Cli::try_parse_from(["cloudlab", "-vvvvv", "list"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cloudlab",
            "plan",
            "--output-format",
            "json",
            "--region",
            "eu-west-1",
            "--no-color",
        ])
        .unwrap();
        assert!(cli.is_json());
        assert!(cli.no_color);
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_synth_args() {
        let cli = Cli::try_parse_from([
            "cloudlab",
            "synth",
            "--stack",
            "CdkLabNetworkStack",
            "--output",
            "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Synth(args) => {
                assert_eq!(args.stack.as_deref(), Some("CdkLabNetworkStack"));
                assert_eq!(args.output, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        assert!(Cli::try_parse_from(["cloudlab", "--output-format", "yaml", "list"]).is_err());
    }
}
