//! Synth command
//!
//! Resolves both stacks and writes the cloud assembly, or prints a single
//! stack's template.

use super::{CommandContext, Runnable};
use anyhow::{Context, Result};
use clap::Parser;
use cloudlab::synth::CloudAssembly;
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the synth command
#[derive(Parser, Debug, Clone)]
pub struct SynthArgs {
    /// Directory to write the assembly to (defaults to the configured one)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Only this stack; printed to stdout unless --output is given
    #[arg(long, short = 's')]
    pub stack: Option<String>,
}

#[derive(Debug, Serialize)]
struct SynthSummary {
    output_dir: PathBuf,
    manifest: PathBuf,
    stacks: Vec<StackSummary>,
}

#[derive(Debug, Serialize)]
struct StackSummary {
    name: String,
    template_file: String,
    resources: usize,
    outputs: usize,
}

#[async_trait::async_trait]
impl Runnable for SynthArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let app = ctx.app()?;
        let assembly = app.synthesize().context("synthesis failed")?;

        if let (Some(stack), None) = (&self.stack, &self.output) {
            let artifact = assembly.stack(stack)?;
            println!("{}", artifact.template.to_json()?);
            return Ok(0);
        }

        let assembly = match &self.stack {
            Some(stack) => {
                let mut single = CloudAssembly::new();
                single.add(assembly.stack(stack)?.clone());
                single
            }
            None => assembly,
        };

        let dir = ctx.output_dir(self.output.as_ref());
        let manifest = assembly
            .write(&dir)
            .with_context(|| format!("failed to write assembly to {}", dir.display()))?;

        let summary = SynthSummary {
            output_dir: dir.clone(),
            manifest,
            stacks: assembly
                .artifacts()
                .iter()
                .map(|a| StackSummary {
                    name: a.name.clone(),
                    template_file: a.template_file(),
                    resources: a.template.resources.len(),
                    outputs: a.template.outputs.len(),
                })
                .collect(),
        };

        if ctx.output.is_json() {
            ctx.output.json(&summary)?;
            return Ok(0);
        }

        ctx.output.banner("SYNTH");
        for stack in &summary.stacks {
            ctx.output.line(&format!(
                "  {}  {} resource(s), {} output(s)  -> {}",
                stack.name,
                stack.resources,
                stack.outputs,
                dir.join(&stack.template_file).display()
            ));
        }
        ctx.output.success(&format!(
            "\nSynthesized {} stack(s) to {}",
            summary.stacks.len(),
            dir.display()
        ));

        Ok(0)
    }
}
