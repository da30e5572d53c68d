//! Init command
//!
//! Writes a starter `cloudlab.toml` holding every default.

use super::{CommandContext, Runnable};
use anyhow::{Context, Result};
use clap::Parser;
use cloudlab::config::{Config, CONFIG_FILE_NAME};
use std::fs;
use std::path::PathBuf;

const HEADER: &str = "# Cloudlab configuration\n\
# Every value below is the built-in default; delete what you do not change.\n\n";

/// Arguments for init command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[async_trait::async_trait]
impl Runnable for InitArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let target = self.path.join(CONFIG_FILE_NAME);
        if target.exists() && !self.force {
            ctx.output.error(&format!(
                "{} already exists (use --force to overwrite)",
                target.display()
            ));
            return Ok(1);
        }

        if !self.path.exists() {
            fs::create_dir_all(&self.path)
                .with_context(|| format!("failed to create {}", self.path.display()))?;
        }

        let content = format!("{}{}", HEADER, Config::default().to_toml()?);
        fs::write(&target, content)
            .with_context(|| format!("failed to write {}", target.display()))?;

        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!({
                "type": "init",
                "path": target,
            }))?;
        } else {
            ctx.output.success(&format!("Created {}", target.display()));
            ctx.output
                .hint("Run 'cloudlab synth' to write the templates to cdk.out.");
        }
        Ok(0)
    }
}
