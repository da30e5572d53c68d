//! Resource dependency graph.
//!
//! Built from a synthesized template. An edge runs from a resource to every
//! resource that needs it (through `Ref`, `Fn::GetAtt` or `DependsOn`), so a
//! topological walk gives the order a deployment engine has to create things
//! in. This enables:
//!
//! - Creation and deletion ordering
//! - Cycle detection
//! - Impact analysis (what breaks if a resource is replaced)

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::template::intrinsic::collect_references;
use crate::template::Template;

/// A node in the graph: one template resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical ID
    pub logical_id: String,
    /// CloudFormation type
    pub resource_type: String,
}

/// Why one resource depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Property value uses `Ref` or `Fn::GetAtt`
    Reference,
    /// Listed in `DependsOn`
    Explicit,
}

/// Dependency graph over the resources of one template.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceNode, DependencyKind>,
    node_indices: HashMap<String, NodeIndex>,
}

impl ResourceGraph {
    /// Build the graph, failing on references to unknown resources.
    ///
    /// `Ref`s to template parameters and pseudo parameters are not resource
    /// dependencies and are skipped.
    pub fn from_template(template: &Template) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for (logical_id, resource) in &template.resources {
            let idx = graph.add_node(ResourceNode {
                logical_id: logical_id.clone(),
                resource_type: resource.resource_type.clone(),
            });
            node_indices.insert(logical_id.clone(), idx);
        }

        for (logical_id, resource) in &template.resources {
            let to = node_indices[logical_id];

            let mut refs = Vec::new();
            collect_references(&resource.properties, &mut refs);
            let edges = refs
                .into_iter()
                .filter(|target| !template.parameters.contains_key(*target))
                .map(|target| (target, DependencyKind::Reference))
                .chain(
                    resource
                        .depends_on
                        .iter()
                        .map(|t| (t.as_str(), DependencyKind::Explicit)),
                );

            for (target, kind) in edges {
                let from = *node_indices
                    .get(target)
                    .ok_or_else(|| Error::DanglingReference {
                        from: logical_id.clone(),
                        to: target.to_string(),
                    })?;
                graph.update_edge(from, to, kind);
            }
        }

        Ok(Self {
            graph,
            node_indices,
        })
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the template had no resources.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check for dependency cycles
    pub fn has_cycles(&self) -> bool {
        !self.cycles().is_empty()
    }

    /// Get all cycles in the graph
    pub fn cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
            })
            .map(|scc| scc.into_iter().map(|idx| self.id(idx)).collect())
            .collect()
    }

    /// Creation order: dependencies first, ties broken by template order.
    pub fn creation_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(self.id(idx));
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != self.len() {
            let cycle = self.cycles().into_iter().next().unwrap_or_default();
            return Err(Error::DependencyCycle(cycle));
        }
        Ok(order)
    }

    /// Deletion order: the reverse of creation order.
    pub fn deletion_order(&self) -> Result<Vec<String>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }

    /// Resources `logical_id` directly depends on.
    pub fn dependencies_of(&self, logical_id: &str) -> Vec<String> {
        self.neighbors(logical_id, Direction::Incoming)
    }

    /// Resources that directly depend on `logical_id`.
    pub fn direct_dependents_of(&self, logical_id: &str) -> Vec<String> {
        self.neighbors(logical_id, Direction::Outgoing)
    }

    /// All resources that depend on `logical_id`, directly or transitively.
    pub fn dependents_of(&self, logical_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        let mut out = Vec::new();

        if let Some(&start) = self.node_indices.get(logical_id) {
            queue.push_back(start);
            while let Some(current) = queue.pop_front() {
                for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                    if seen.insert(next) {
                        out.push(self.id(next));
                        queue.push_back(next);
                    }
                }
            }
        }

        out
    }

    /// Node lookup.
    pub fn node(&self, logical_id: &str) -> Option<&ResourceNode> {
        self.node_indices
            .get(logical_id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    fn neighbors(&self, logical_id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.node_indices.get(logical_id) else {
            return Vec::new();
        };
        let mut ids: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|i| self.id(i)).collect()
    }

    fn id(&self, idx: NodeIndex) -> String {
        self.graph
            .node_weight(idx)
            .map(|n| n.logical_id.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::intrinsic::{get_att, reference};
    use crate::template::{Parameter, Resource};
    use serde_json::json;

    fn template(resources: Vec<(&str, Resource)>) -> Template {
        let mut t = Template::default();
        for (id, r) in resources {
            t.resources.insert(id.to_string(), r);
        }
        t
    }

    #[test]
    fn test_creation_order_respects_references() {
        let t = template(vec![
            (
                "Instance",
                Resource::new(
                    "AWS::EC2::Instance",
                    json!({ "SecurityGroupIds": [get_att("Sg", "GroupId")] }),
                )
                .depends_on("Role"),
            ),
            ("Sg", Resource::new("AWS::EC2::SecurityGroup", json!({ "VpcId": "vpc-1" }))),
            ("Role", Resource::new("AWS::IAM::Role", json!({}))),
        ]);
        let graph = ResourceGraph::from_template(&t).unwrap();
        assert_eq!(graph.edge_count(), 2);
        let order = graph.creation_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("Sg") < pos("Instance"));
        assert!(pos("Role") < pos("Instance"));
        assert_eq!(graph.deletion_order().unwrap()[0], "Instance");
    }

    #[test]
    fn test_ties_follow_template_order() {
        let t = template(vec![
            ("B", Resource::new("AWS::SNS::Topic", json!({}))),
            ("A", Resource::new("AWS::SNS::Topic", json!({}))),
        ]);
        let graph = ResourceGraph::from_template(&t).unwrap();
        assert_eq!(graph.creation_order().unwrap(), vec!["B", "A"]);
    }

    #[test]
    fn test_parameter_refs_are_not_edges() {
        let mut t = template(vec![(
            "Instance",
            Resource::new("AWS::EC2::Instance", json!({ "ImageId": reference("Ami") })),
        )]);
        t.parameters.insert(
            "Ami".into(),
            Parameter {
                parameter_type: "String".into(),
                default: None,
            },
        );
        let graph = ResourceGraph::from_template(&t).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_cycle_detected() {
        let t = template(vec![
            ("A", Resource::new("AWS::SNS::Topic", json!({ "X": reference("B") }))),
            ("B", Resource::new("AWS::SNS::Topic", json!({ "X": reference("A") }))),
        ]);
        let graph = ResourceGraph::from_template(&t).unwrap();
        assert!(graph.has_cycles());
        assert!(matches!(
            graph.creation_order(),
            Err(Error::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let t = template(vec![(
            "A",
            Resource::new("AWS::SNS::Topic", json!({ "X": reference("A") })),
        )]);
        let graph = ResourceGraph::from_template(&t).unwrap();
        assert!(graph.has_cycles());
    }

    #[test]
    fn test_transitive_dependents() {
        let t = template(vec![
            ("Vpc", Resource::new("AWS::EC2::VPC", json!({}))),
            ("Subnet", Resource::new("AWS::EC2::Subnet", json!({ "VpcId": reference("Vpc") }))),
            (
                "Instance",
                Resource::new("AWS::EC2::Instance", json!({ "SubnetId": reference("Subnet") })),
            ),
        ]);
        let graph = ResourceGraph::from_template(&t).unwrap();
        assert_eq!(graph.dependents_of("Vpc"), vec!["Subnet", "Instance"]);
        assert_eq!(graph.dependencies_of("Instance"), vec!["Subnet"]);
        assert_eq!(graph.direct_dependents_of("Vpc"), vec!["Subnet"]);
        assert_eq!(graph.node("Vpc").unwrap().resource_type, "AWS::EC2::VPC");
    }
}
