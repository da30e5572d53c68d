use super::intrinsic::reference;
use super::{make_unique_id, ConstructPath, Export, Output, Parameter, Resource, Template};
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use serde_json::json;
use tracing::trace;

/// Accumulates the resources of one stack and checks the result.
#[derive(Debug, Clone)]
pub struct StackBuilder {
    name: String,
    template: Template,
}

impl StackBuilder {
    /// Start an empty stack.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: Template::default(),
        }
    }

    /// Stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the stack itself, parent of every construct in it.
    pub fn root(&self) -> ConstructPath {
        ConstructPath::stack(&self.name)
    }

    /// Add a resource at `path`, returning its logical ID.
    pub fn add_resource(&mut self, path: &ConstructPath, mut resource: Resource) -> Result<String> {
        let logical_id = path.logical_id();
        if self.template.resources.contains_key(&logical_id) {
            return Err(Error::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id,
            });
        }
        resource.metadata = json!({ "aws:cdk:path": path.to_string() });
        trace!(%logical_id, resource_type = %resource.resource_type, "adding resource");
        self.template.resources.insert(logical_id.clone(), resource);
        Ok(logical_id)
    }

    /// Declare a parameter once; later declarations with the same id are
    /// no-ops.
    pub fn add_parameter(&mut self, id: impl Into<String>, parameter: Parameter) -> String {
        let id = id.into();
        self.template
            .parameters
            .entry(id.clone())
            .or_insert(parameter);
        id
    }

    /// Export a resource's `Ref` and return the export name other stacks
    /// import it by.
    pub fn export_ref(&mut self, logical_id: &str) -> Result<String> {
        if !self.template.resources.contains_key(logical_id) {
            return Err(Error::DanglingReference {
                from: "Exports".to_string(),
                to: logical_id.to_string(),
            });
        }
        let output_id = make_unique_id(&["Exports", &format!("OutputRef{}", logical_id)]);
        let export_name = format!("{}:{}", self.name, output_id);
        self.template.outputs.insert(
            output_id,
            Output {
                value: reference(logical_id),
                description: None,
                export: Some(Export {
                    name: export_name.clone(),
                }),
            },
        );
        Ok(export_name)
    }

    /// The template built so far.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Finish the stack: every reference must resolve and the resources must
    /// admit a creation order.
    pub fn build(self) -> Result<Template> {
        let graph = ResourceGraph::from_template(&self.template)?;
        graph.creation_order()?;
        Ok(self.template)
    }
}
