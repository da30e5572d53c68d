//! Deployment seam.
//!
//! Provisioning is left to a [`DeploymentEngine`]; this crate only ships
//! [`DryRunEngine`], which predicts per-resource outcomes from the difference
//! between the last synthesized assembly and the new one. [`deploy_app`]
//! drives any engine through the stacks in dependency order.

use crate::diff::{ChangeKind, TemplateDiff};
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::synth::{CloudAssembly, StackArtifact};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, instrument, warn};

/// What the engine did (or would do) to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    /// New resource
    Create,
    /// Changed in place or replaced
    Update,
    /// Left alone
    Unchanged,
    /// No longer in the template
    Delete,
    /// The engine gave up on it
    Failed,
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceAction::Create => "create",
            ResourceAction::Update => "update",
            ResourceAction::Unchanged => "unchanged",
            ResourceAction::Delete => "delete",
            ResourceAction::Failed => "failed",
        })
    }
}

/// Outcome for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    /// Logical ID
    pub logical_id: String,
    /// Resource type
    pub resource_type: String,
    /// Action
    pub action: ResourceAction,
    /// An update replaces the physical resource
    #[serde(default)]
    pub replacement: bool,
    /// Engine message, mostly for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// How a stack fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// Changes applied
    Deployed,
    /// Nothing to do
    NoChanges,
    /// The engine failed
    Failed,
    /// Not attempted because a dependency failed
    Skipped,
}

/// Outcome for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutcome {
    /// Stack name
    pub stack: String,
    /// Status
    pub status: StackStatus,
    /// Per-resource outcomes, in the order the engine handled them
    pub resources: Vec<ResourceOutcome>,
    /// Why the stack failed or was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StackOutcome {
    /// Resources with a given action.
    pub fn count(&self, action: ResourceAction) -> usize {
        self.resources.iter().filter(|r| r.action == action).count()
    }
}

/// Something that can turn a stack artifact into real (or predicted)
/// resources.
#[async_trait]
pub trait DeploymentEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Deploy one stack and report what happened to each resource.
    async fn deploy(&self, artifact: &StackArtifact) -> Result<Vec<ResourceOutcome>>;
}

/// Predicts outcomes without contacting a provider.
#[derive(Debug, Clone, Default)]
pub struct DryRunEngine {
    previous: Option<CloudAssembly>,
}

impl DryRunEngine {
    /// Compare against `previous`; `None` treats every stack as new.
    pub fn new(previous: Option<CloudAssembly>) -> Self {
        Self { previous }
    }

    /// Outcomes for `artifact`: creates and updates in creation order, then
    /// deletes in reverse creation order of the old template.
    pub fn plan(&self, artifact: &StackArtifact) -> Result<Vec<ResourceOutcome>> {
        let old = self
            .previous
            .as_ref()
            .and_then(|assembly| assembly.stack(&artifact.name).ok())
            .map(|a| &a.template);
        let diff = TemplateDiff::compute(&artifact.name, old, &artifact.template);

        let graph = ResourceGraph::from_template(&artifact.template)?;
        let mut outcomes = Vec::with_capacity(graph.len());
        for logical_id in graph.creation_order()? {
            let resource_type = graph
                .node(&logical_id)
                .map(|n| n.resource_type.clone())
                .unwrap_or_default();
            let (action, replacement) = match diff.change_for(&logical_id) {
                Some(change) if change.kind == ChangeKind::Added => (ResourceAction::Create, false),
                Some(change) => (ResourceAction::Update, change.replacement),
                None => (ResourceAction::Unchanged, false),
            };
            outcomes.push(ResourceOutcome {
                logical_id,
                resource_type,
                action,
                replacement,
                message: None,
            });
        }

        if let Some(old) = old {
            let removed: HashSet<&str> = diff
                .of_kind(ChangeKind::Removed)
                .map(|c| c.logical_id.as_str())
                .collect();
            if !removed.is_empty() {
                let old_graph = ResourceGraph::from_template(old)?;
                for logical_id in old_graph.deletion_order()? {
                    if removed.contains(logical_id.as_str()) {
                        let resource_type = old
                            .resources
                            .get(&logical_id)
                            .map(|r| r.resource_type.clone())
                            .unwrap_or_default();
                        outcomes.push(ResourceOutcome {
                            logical_id,
                            resource_type,
                            action: ResourceAction::Delete,
                            replacement: false,
                            message: None,
                        });
                    }
                }
            }
        }

        Ok(outcomes)
    }
}

#[async_trait]
impl DeploymentEngine for DryRunEngine {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn deploy(&self, artifact: &StackArtifact) -> Result<Vec<ResourceOutcome>> {
        self.plan(artifact)
    }
}

/// Deploy every stack of `assembly` in order. A failed stack marks every
/// stack that depends on it, directly or not, as skipped.
#[instrument(skip_all, fields(engine = engine.name()))]
pub async fn deploy_app(
    engine: &dyn DeploymentEngine,
    assembly: &CloudAssembly,
) -> Vec<StackOutcome> {
    let mut blocked: HashSet<String> = HashSet::new();
    let mut outcomes = Vec::with_capacity(assembly.artifacts().len());

    for artifact in assembly.artifacts() {
        if let Some(dep) = artifact.dependencies.iter().find(|d| blocked.contains(*d)) {
            warn!(stack = %artifact.name, dependency = %dep, "skipping stack");
            blocked.insert(artifact.name.clone());
            outcomes.push(StackOutcome {
                stack: artifact.name.clone(),
                status: StackStatus::Skipped,
                resources: Vec::new(),
                message: Some(format!("dependency '{}' did not deploy", dep)),
            });
            continue;
        }

        let outcome = match engine.deploy(artifact).await {
            Ok(resources) => {
                let failed = resources
                    .iter()
                    .find(|r| r.action == ResourceAction::Failed);
                let status = if failed.is_some() {
                    StackStatus::Failed
                } else if resources
                    .iter()
                    .all(|r| r.action == ResourceAction::Unchanged)
                {
                    StackStatus::NoChanges
                } else {
                    StackStatus::Deployed
                };
                let message = failed.map(|r| {
                    format!(
                        "{}: {}",
                        r.logical_id,
                        r.message.as_deref().unwrap_or("failed")
                    )
                });
                StackOutcome {
                    stack: artifact.name.clone(),
                    status,
                    resources,
                    message,
                }
            }
            Err(e) => StackOutcome {
                stack: artifact.name.clone(),
                status: StackStatus::Failed,
                resources: Vec::new(),
                message: Some(e.to_string()),
            },
        };

        if outcome.status == StackStatus::Failed {
            warn!(stack = %artifact.name, "stack failed");
            blocked.insert(artifact.name.clone());
        } else {
            info!(stack = %artifact.name, status = ?outcome.status, "stack done");
        }
        outcomes.push(outcome);
    }

    outcomes
}

/// The first failure in `outcomes` as an error.
pub fn first_failure(outcomes: &[StackOutcome]) -> Option<Error> {
    outcomes
        .iter()
        .find(|o| o.status == StackStatus::Failed)
        .map(|o| Error::DeploymentFailed {
            stack: o.stack.clone(),
            message: o.message.clone().unwrap_or_default(),
        })
}
