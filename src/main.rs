//! Cloudlab - network and web-server stacks as code
//!
//! This is the main entry point for the Cloudlab CLI.

mod cli;

use anyhow::Result;
use cli::commands::{CommandContext, Runnable};
use cli::{Cli, Commands};
use cloudlab::config::{Config, LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse_args();

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for(&err)
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(region) = &cli.region {
        config.environment.region = Some(region.clone());
    }
    if let Some(account) = &cli.account {
        config.environment.account = Some(account.clone());
    }

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), &config.logging);

    // Display version if verbose
    if cli.verbosity() >= 2 {
        eprintln!("Cloudlab v{} by {}", VERSION, AUTHORS);
    }

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    // Execute the appropriate command
    match &cli.command {
        Commands::Synth(args) => args.run(&mut ctx).await,
        Commands::Diff(args) => args.run(&mut ctx).await,
        Commands::Plan(args) => args.run(&mut ctx).await,
        Commands::List(args) => args.run(&mut ctx).await,
        Commands::Validate(args) => args.run(&mut ctx).await,
        Commands::Init(args) => args.run(&mut ctx).await,
    }
}

/// Initialize logging. RUST_LOG wins, then -v, then the configured level.
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Library errors carry their own exit codes; anything else is 1.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<cloudlab::Error>()
        .map(cloudlab::Error::exit_code)
        .unwrap_or(1)
}
