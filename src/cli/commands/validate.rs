//! Validate command
//!
//! Resolves both stacks and runs the structural invariant checks without
//! writing anything.

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use cloudlab::invariants::{self, Violation};
use serde::Serialize;

/// Arguments for the validate command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {}

#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    valid: bool,
    violations: &'a [Violation],
}

#[async_trait::async_trait]
impl Runnable for ValidateArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let app = ctx.app()?;
        let violations = invariants::check(&app);

        if ctx.output.is_json() {
            ctx.output.json(&ValidationReport {
                valid: violations.is_empty(),
                violations: &violations,
            })?;
            return Ok(if violations.is_empty() { 0 } else { 1 });
        }

        ctx.output.banner("VALIDATION");
        let topology = app.network().topology();
        ctx.output.info(&format!(
            "{} subnet(s) across {} availability zone(s), {} web server(s)",
            topology.subnets.len(),
            topology.availability_zones.len(),
            app.web_server().plan().instances.len()
        ));

        if violations.is_empty() {
            ctx.output.success("All invariants hold.");
            return Ok(0);
        }

        for violation in &violations {
            ctx.output.error(&violation.to_string());
        }
        ctx.output.section("Validation Results");
        ctx.output
            .line(&format!("{} invariant violation(s)", violations.len()));
        Ok(1)
    }
}
