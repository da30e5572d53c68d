//! Plan command - dry-run deployment
//!
//! Runs the dry-run engine over the synthesized stacks and reports the
//! predicted action for every resource.

use super::{previous_assembly, CommandContext, Runnable};
use anyhow::{Context, Result};
use clap::Parser;
use cloudlab::deploy::{deploy_app, first_failure, DryRunEngine, ResourceAction, StackStatus};
use colored::Colorize;
use std::path::PathBuf;

/// Arguments for the plan command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Assembly directory holding the currently deployed templates
    /// (defaults to the configured one)
    #[arg(long)]
    pub against: Option<PathBuf>,

    /// Show unchanged resources too
    #[arg(long)]
    pub all: bool,
}

#[async_trait::async_trait]
impl Runnable for PlanArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let dir = ctx.output_dir(self.against.as_ref());
        let previous = previous_assembly(&dir)?;
        let assembly = ctx.app()?.synthesize().context("synthesis failed")?;

        let engine = DryRunEngine::new(previous);
        let outcomes = deploy_app(&engine, &assembly).await;

        if ctx.output.is_json() {
            ctx.output.json(&outcomes)?;
        } else {
            let color = ctx.output.use_color();
            ctx.output.banner("PLAN");
            for outcome in &outcomes {
                ctx.output.section(&outcome.stack);
                if outcome.status == StackStatus::NoChanges {
                    ctx.output.line("No changes");
                    continue;
                }

                for resource in &outcome.resources {
                    if resource.action == ResourceAction::Unchanged && !self.all {
                        continue;
                    }
                    let action = format!("{:<9}", resource.action.to_string());
                    let action = match (color, resource.action) {
                        (true, ResourceAction::Create) => action.green().to_string(),
                        (true, ResourceAction::Update) => action.yellow().to_string(),
                        (true, ResourceAction::Delete) | (true, ResourceAction::Failed) => {
                            action.red().to_string()
                        }
                        _ => action,
                    };
                    let replace = if resource.replacement {
                        " (replace)"
                    } else {
                        ""
                    };
                    ctx.output.line(&format!(
                        "  {} {} {}{}",
                        action, resource.resource_type, resource.logical_id, replace
                    ));
                }

                ctx.output.line(&format!(
                    "\nPlan: {} to create, {} to update, {} to delete",
                    outcome.count(ResourceAction::Create),
                    outcome.count(ResourceAction::Update),
                    outcome.count(ResourceAction::Delete)
                ));
                if let Some(message) = &outcome.message {
                    ctx.output.warning(message);
                }
            }
        }

        if let Some(err) = first_failure(&outcomes) {
            return Err(err.into());
        }
        Ok(0)
    }
}
