//! Security groups and their ingress rules.
//!
//! Rules whose peer is a CIDR are rendered inline on the group. Rules whose
//! peer is another security group become standalone
//! `AWS::EC2::SecurityGroupIngress` resources, which keeps two groups that
//! reference each other from forming a dependency cycle.

use crate::error::{Error, Result};
use crate::template::intrinsic::get_att;
use crate::template::{make_unique_id, Resource, StackBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// Anywhere on the IPv4 internet.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Traffic direction of a rule. Only ingress is modeled; egress is the
/// group-wide allow-all default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Inbound
    Ingress,
}

/// IP protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    Tcp,
}

impl Protocol {
    /// CloudFormation `IpProtocol` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

/// Source of inbound traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// `0.0.0.0/0`
    AnyIpv4,
    /// Members of another security group, by construct id
    SecurityGroup(String),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::AnyIpv4 => f.write_str(ANY_IPV4),
            Peer::SecurityGroup(id) => write!(f, "security group {}", id),
        }
    }
}

/// One firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Direction
    pub direction: Direction,
    /// Traffic source
    pub peer: Peer,
    /// Protocol
    pub protocol: Protocol,
    /// Port, both ends of the range
    pub port: u16,
}

impl SecurityRule {
    /// Allow TCP `port` from `peer`.
    pub fn tcp_ingress(peer: Peer, port: u16) -> Self {
        Self {
            direction: Direction::Ingress,
            peer,
            protocol: Protocol::Tcp,
            port,
        }
    }
}

/// A security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    /// Construct id
    pub construct_id: String,
    /// `GroupDescription`
    pub description: String,
    /// Attach an allow-all egress rule
    pub allow_all_outbound: bool,
    /// Ingress rules in declaration order
    pub rules: Vec<SecurityRule>,
}

/// Logical ID and stack-unique id of a synthesized group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedGroup {
    /// Logical ID of the `AWS::EC2::SecurityGroup`
    pub logical_id: String,
    /// Unique id used in rule descriptions
    pub unique_id: String,
}

impl SecurityGroup {
    /// A group with allow-all egress and no ingress.
    pub fn new(construct_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            construct_id: construct_id.into(),
            description: description.into(),
            allow_all_outbound: true,
            rules: Vec::new(),
        }
    }

    /// Add an ingress rule, ignoring exact duplicates.
    pub fn add_ingress_rule(&mut self, peer: Peer, port: u16) {
        let rule = SecurityRule::tcp_ingress(peer, port);
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    /// Ports admitted from `peer`.
    pub fn ports_from(&self, peer: &Peer) -> Vec<u16> {
        self.rules
            .iter()
            .filter(|r| r.direction == Direction::Ingress && &r.peer == peer)
            .map(|r| r.port)
            .collect()
    }

    /// Whether any ingress rule names the group `construct_id` as its peer.
    pub fn admits_group(&self, construct_id: &str) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(&r.peer, Peer::SecurityGroup(id) if id == construct_id))
    }

    /// Add the group and its rules to `stack`.
    ///
    /// Peer groups must already be in `synthesized`; the new group is added
    /// to it on success.
    pub fn synthesize(
        &self,
        stack: &mut StackBuilder,
        vpc_id: &Value,
        synthesized: &mut HashMap<String, SynthesizedGroup>,
    ) -> Result<SynthesizedGroup> {
        let root = stack.root();
        let group_path = root.child(&self.construct_id);

        let inline: Vec<Value> = self
            .rules
            .iter()
            .filter(|r| r.peer == Peer::AnyIpv4)
            .map(|r| {
                json!({
                    "CidrIp": ANY_IPV4,
                    "Description": format!("from {}:{}", ANY_IPV4, r.port),
                    "FromPort": r.port,
                    "IpProtocol": r.protocol.as_str(),
                    "ToPort": r.port
                })
            })
            .collect();

        let mut properties = json!({
            "GroupDescription": self.description,
            "VpcId": vpc_id
        });
        if self.allow_all_outbound {
            properties["SecurityGroupEgress"] = json!([{
                "CidrIp": ANY_IPV4,
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1"
            }]);
        }
        if !inline.is_empty() {
            properties["SecurityGroupIngress"] = Value::Array(inline);
        }

        let logical_id = stack.add_resource(
            &group_path.child("Resource"),
            Resource::new("AWS::EC2::SecurityGroup", properties),
        )?;

        for rule in &self.rules {
            let Peer::SecurityGroup(peer_id) = &rule.peer else {
                continue;
            };
            let peer = synthesized
                .get(peer_id)
                .ok_or_else(|| Error::DanglingReference {
                    from: self.construct_id.clone(),
                    to: peer_id.clone(),
                })?;
            let description = format!("from {}:{}", peer.unique_id, rule.port);
            stack.add_resource(
                &group_path.child(&description),
                Resource::new(
                    "AWS::EC2::SecurityGroupIngress",
                    json!({
                        "Description": description,
                        "FromPort": rule.port,
                        "GroupId": get_att(&logical_id, "GroupId"),
                        "IpProtocol": rule.protocol.as_str(),
                        "SourceSecurityGroupId": get_att(&peer.logical_id, "GroupId"),
                        "ToPort": rule.port
                    }),
                ),
            )?;
        }

        let group = SynthesizedGroup {
            logical_id,
            unique_id: make_unique_id(&[root.stack_name(), self.construct_id.as_str()]),
        };
        synthesized.insert(self.construct_id.clone(), group.clone());
        Ok(group)
    }
}
