//! Template diffing.
//!
//! Compares a previously synthesized template with a new one at the
//! resource level, and renders the textual difference of the JSON.
//!
//! # Example
//!
//! ```rust
//! use cloudlab::diff::TemplateDiff;
//! use cloudlab::template::Template;
//!
//! let template = Template::default();
//! let diff = TemplateDiff::compute("Net", Some(&template), &template);
//! assert!(!diff.has_changes());
//! ```

mod text;

pub use text::{generate_diff, ChangeType, DiffHunk, DiffLine, DiffResult, DiffStats};

use crate::error::Result;
use crate::template::{Resource, Template};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Properties that cannot be changed in place, by resource type.
const REPLACEMENT_PROPERTIES: &[(&str, &[&str])] = &[
    ("AWS::EC2::VPC", &["CidrBlock", "InstanceTenancy"]),
    (
        "AWS::EC2::Subnet",
        &["AvailabilityZone", "CidrBlock", "VpcId"],
    ),
    (
        "AWS::EC2::SecurityGroup",
        &["GroupDescription", "VpcId"],
    ),
    (
        "AWS::EC2::Instance",
        &["AvailabilityZone", "ImageId", "SubnetId"],
    ),
    ("AWS::EC2::NatGateway", &["AllocationId", "SubnetId"]),
    ("AWS::IAM::Role", &["AssumeRolePolicyDocument"]),
    (
        "AWS::RDS::DBInstance",
        &["DBName", "Engine", "MasterUsername"],
    ),
];

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Only in the new template
    Added,
    /// Only in the old template
    Removed,
    /// In both, different
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        })
    }
}

/// Change to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Logical ID
    pub logical_id: String,
    /// Resource type (the new one for type changes)
    pub resource_type: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Top-level keys that differ: property names, plus `DependsOn`,
    /// `DeletionPolicy` or `UpdateReplacePolicy`
    pub changed_properties: Vec<String>,
    /// The change forces the physical resource to be replaced
    pub replacement: bool,
}

/// Resource-level difference between two versions of a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDiff {
    /// Stack name
    pub stack: String,
    /// Changed resources, old template order first, then additions
    pub resources: Vec<ResourceChange>,
    /// Parameters added, removed or changed
    pub parameters: Vec<String>,
    /// Outputs added, removed or changed
    pub outputs: Vec<String>,
}

impl TemplateDiff {
    /// Diff `new` against `old`; a missing `old` means the stack is new.
    pub fn compute(stack: &str, old: Option<&Template>, new: &Template) -> Self {
        let empty = Template::default();
        let old = old.unwrap_or(&empty);
        let mut resources = Vec::new();

        for (id, before) in &old.resources {
            match new.resources.get(id) {
                None => resources.push(ResourceChange {
                    logical_id: id.clone(),
                    resource_type: before.resource_type.clone(),
                    kind: ChangeKind::Removed,
                    changed_properties: Vec::new(),
                    replacement: false,
                }),
                Some(after) => {
                    if let Some(change) = compare_resource(id, before, after) {
                        resources.push(change);
                    }
                }
            }
        }
        for (id, after) in &new.resources {
            if !old.resources.contains_key(id) {
                resources.push(ResourceChange {
                    logical_id: id.clone(),
                    resource_type: after.resource_type.clone(),
                    kind: ChangeKind::Added,
                    changed_properties: Vec::new(),
                    replacement: false,
                });
            }
        }

        Self {
            stack: stack.to_string(),
            resources,
            parameters: changed_keys(&old.parameters, &new.parameters),
            outputs: changed_keys(&old.outputs, &new.outputs),
        }
    }

    /// Whether anything differs.
    pub fn has_changes(&self) -> bool {
        !self.resources.is_empty() || !self.parameters.is_empty() || !self.outputs.is_empty()
    }

    /// Changes of one kind.
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &ResourceChange> {
        self.resources.iter().filter(move |c| c.kind == kind)
    }

    /// Change recorded for `logical_id`, if any.
    pub fn change_for(&self, logical_id: &str) -> Option<&ResourceChange> {
        self.resources.iter().find(|c| c.logical_id == logical_id)
    }

    /// Count of (added, removed, modified) resources.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.of_kind(ChangeKind::Added).count(),
            self.of_kind(ChangeKind::Removed).count(),
            self.of_kind(ChangeKind::Modified).count(),
        )
    }
}

/// Unified diff of the two templates' JSON.
pub fn template_text_diff(
    stack: &str,
    old: Option<&Template>,
    new: &Template,
    context_lines: usize,
) -> Result<DiffResult> {
    let old_text = match old {
        Some(template) => template.to_json()? + "\n",
        None => String::new(),
    };
    let new_text = new.to_json()? + "\n";
    let label = crate::synth::template_file_name(stack);
    Ok(generate_diff(
        &old_text,
        &new_text,
        &format!("a/{}", label),
        &format!("b/{}", label),
        context_lines,
    ))
}

fn compare_resource(id: &str, before: &Resource, after: &Resource) -> Option<ResourceChange> {
    if before.resource_type != after.resource_type {
        return Some(ResourceChange {
            logical_id: id.to_string(),
            resource_type: after.resource_type.clone(),
            kind: ChangeKind::Modified,
            changed_properties: vec!["Type".to_string()],
            replacement: true,
        });
    }

    let mut keys: BTreeSet<&str> = BTreeSet::new();
    if let Some(props) = before.properties.as_object() {
        keys.extend(props.keys().map(String::as_str));
    }
    if let Some(props) = after.properties.as_object() {
        keys.extend(props.keys().map(String::as_str));
    }
    let mut changed: Vec<String> = keys
        .into_iter()
        .filter(|k| before.property(k) != after.property(k))
        .map(str::to_string)
        .collect();

    if before.depends_on != after.depends_on {
        changed.push("DependsOn".to_string());
    }
    if before.deletion_policy != after.deletion_policy {
        changed.push("DeletionPolicy".to_string());
    }
    if before.update_replace_policy != after.update_replace_policy {
        changed.push("UpdateReplacePolicy".to_string());
    }

    if changed.is_empty() {
        return None;
    }

    let immutable = REPLACEMENT_PROPERTIES
        .iter()
        .find(|(t, _)| *t == after.resource_type)
        .map(|(_, props)| *props)
        .unwrap_or(&[]);
    let replacement = changed.iter().any(|p| immutable.contains(&p.as_str()));

    Some(ResourceChange {
        logical_id: id.to_string(),
        resource_type: after.resource_type.clone(),
        kind: ChangeKind::Modified,
        changed_properties: changed,
        replacement,
    })
}

fn changed_keys<V: PartialEq>(
    old: &indexmap::IndexMap<String, V>,
    new: &indexmap::IndexMap<String, V>,
) -> Vec<String> {
    let mut keys: Vec<String> = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(
        new.keys()
            .filter(|k| !old.contains_key(*k))
            .cloned(),
    );
    keys
}
