//! Diff command
//!
//! Compares freshly synthesized templates with the ones in an earlier
//! assembly directory.

use super::{previous_assembly, CommandContext, Runnable};
use anyhow::{Context, Result};
use clap::Parser;
use cloudlab::diff::{template_text_diff, ChangeKind, TemplateDiff};
use colored::Colorize;
use std::path::PathBuf;

/// Arguments for the diff command
#[derive(Parser, Debug, Clone)]
pub struct DiffArgs {
    /// Assembly directory to compare against (defaults to the configured one)
    #[arg(long)]
    pub against: Option<PathBuf>,

    /// Also print the unified diff of the template JSON
    #[arg(long)]
    pub text: bool,

    /// Context lines for --text
    #[arg(long, default_value = "3")]
    pub context: usize,

    /// Exit with status 1 when anything differs
    #[arg(long)]
    pub fail: bool,
}

#[async_trait::async_trait]
impl Runnable for DiffArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let dir = ctx.output_dir(self.against.as_ref());
        let previous = previous_assembly(&dir)?;
        if previous.is_none() {
            ctx.output.warning(&format!(
                "No assembly in {}; every stack is new",
                dir.display()
            ));
        }

        let assembly = ctx.app()?.synthesize().context("synthesis failed")?;

        let mut diffs = Vec::new();
        for artifact in assembly.artifacts() {
            let old = previous
                .as_ref()
                .and_then(|p| p.stack(&artifact.name).ok())
                .map(|a| &a.template);
            diffs.push((
                TemplateDiff::compute(&artifact.name, old, &artifact.template),
                old,
                &artifact.template,
            ));
        }
        let changed = diffs.iter().any(|(d, _, _)| d.has_changes());

        if ctx.output.is_json() {
            let report: Vec<&TemplateDiff> = diffs.iter().map(|(d, _, _)| d).collect();
            ctx.output.json(&report)?;
            return Ok(if self.fail && changed { 1 } else { 0 });
        }

        let color = ctx.output.use_color();
        for (diff, old, new) in &diffs {
            ctx.output.section(&format!("Stack {}", diff.stack));
            if !diff.has_changes() {
                ctx.output.line("There were no differences");
                continue;
            }

            for change in &diff.resources {
                let marker = match change.kind {
                    ChangeKind::Added => "[+]",
                    ChangeKind::Removed => "[-]",
                    ChangeKind::Modified => "[~]",
                };
                let marker = match (color, change.kind) {
                    (true, ChangeKind::Added) => marker.green().to_string(),
                    (true, ChangeKind::Removed) => marker.red().to_string(),
                    (true, ChangeKind::Modified) => marker.yellow().to_string(),
                    (false, _) => marker.to_string(),
                };
                let mut line = format!("{} {} {}", marker, change.resource_type, change.logical_id);
                if !change.changed_properties.is_empty() {
                    line.push_str(&format!(" ({})", change.changed_properties.join(", ")));
                }
                if change.replacement {
                    let note = " requires replacement";
                    line.push_str(&if color {
                        note.red().bold().to_string()
                    } else {
                        note.to_string()
                    });
                }
                ctx.output.line(&line);
            }
            for parameter in &diff.parameters {
                ctx.output.line(&format!("[~] Parameter {}", parameter));
            }
            for output in &diff.outputs {
                ctx.output.line(&format!("[~] Output {}", output));
            }

            let (added, removed, modified) = diff.counts();
            ctx.output.line(&format!(
                "\n{} to add, {} to change, {} to remove",
                added, modified, removed
            ));

            if self.text {
                let text = template_text_diff(&diff.stack, *old, new, self.context)?;
                ctx.output.line("");
                ctx.output.line(&text.render(color));
                ctx.output.debug(&text.stats.to_string());
            }
        }

        Ok(if self.fail && changed { 1 } else { 0 })
    }
}
