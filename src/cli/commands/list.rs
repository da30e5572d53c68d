//! List command

use super::{CommandContext, Runnable};
use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use serde::Serialize;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Show resource counts per type
    #[arg(long, short = 'l')]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct StackEntry {
    name: String,
    environment: String,
    dependencies: Vec<String>,
    resources: usize,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    resource_types: IndexMap<String, usize>,
}

#[async_trait::async_trait]
impl Runnable for ListArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let assembly = ctx.app()?.synthesize().context("synthesis failed")?;

        let entries: Vec<StackEntry> = assembly
            .artifacts()
            .iter()
            .map(|a| {
                let mut resource_types: IndexMap<String, usize> = IndexMap::new();
                if self.long {
                    for resource in a.template.resources.values() {
                        *resource_types
                            .entry(resource.resource_type.clone())
                            .or_default() += 1;
                    }
                }
                StackEntry {
                    name: a.name.clone(),
                    environment: a.environment.clone(),
                    dependencies: a.dependencies.clone(),
                    resources: a.template.resources.len(),
                    resource_types,
                }
            })
            .collect();

        if ctx.output.is_json() {
            ctx.output.json(&entries)?;
            return Ok(0);
        }

        let rows: Vec<Vec<String>> = entries
            .iter()
            .map(|e| {
                vec![
                    e.name.clone(),
                    e.resources.to_string(),
                    if e.dependencies.is_empty() {
                        "-".to_string()
                    } else {
                        e.dependencies.join(", ")
                    },
                    e.environment.clone(),
                ]
            })
            .collect();
        ctx.output
            .table(&["STACK", "RESOURCES", "DEPENDS ON", "ENVIRONMENT"], &rows);

        if self.long {
            for entry in &entries {
                ctx.output.section(&entry.name);
                for (resource_type, count) in &entry.resource_types {
                    ctx.output.line(&format!("  {:<40} {}", resource_type, count));
                }
            }
        }

        Ok(0)
    }
}
