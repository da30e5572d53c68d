//! Structural checks over the resolved stacks.
//!
//! These run before every synthesis and from `cloudlab validate`. Each check
//! reports every violation it finds instead of stopping at the first one.

use crate::error::Error;
use crate::network::{NetworkTopology, SubnetKind};
use crate::security::Peer;
use crate::stacks::{App, WebServerPlan};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which invariant was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Every AZ carries one subnet of every plan group
    SubnetsPerZone,
    /// Subnets sit inside the VPC block and do not overlap
    SubnetAddressing,
    /// One web server per public subnet
    InstancePerPublicSubnet,
    /// The web group never admits the database group
    SecurityGroupAsymmetry,
    /// The database group admits only its engine port, only from the web group
    DatabaseIngress,
    /// The database lives in private subnets only
    DatabasePlacement,
}

impl Rule {
    /// Stable name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::SubnetsPerZone => "subnets_per_zone",
            Rule::SubnetAddressing => "subnet_addressing",
            Rule::InstancePerPublicSubnet => "instance_per_public_subnet",
            Rule::SecurityGroupAsymmetry => "security_group_asymmetry",
            Rule::DatabaseIngress => "database_ingress",
            Rule::DatabasePlacement => "database_placement",
        }
    }
}

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The rule
    pub rule: Rule,
    /// What exactly is wrong
    pub message: String,
}

impl Violation {
    fn new(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule.as_str(), self.message)
    }
}

/// Run every check against both stacks.
pub fn check(app: &App) -> Vec<Violation> {
    let topology = app.network().topology();
    let mut violations = check_network(topology);
    violations.extend(check_web_server(app.web_server().plan(), topology));
    violations
}

/// Collapse violations into an error.
pub fn into_error(violations: &[Violation]) -> Error {
    Error::InvariantViolation {
        count: violations.len(),
        summary: violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    }
}

/// Checks that only need the network.
pub fn check_network(topology: &NetworkTopology) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut groups: Vec<&str> = Vec::new();
    for subnet in &topology.subnets {
        if !groups.contains(&subnet.group.as_str()) {
            groups.push(subnet.group.as_str());
        }
    }
    for az_index in 0..topology.availability_zones.len() {
        for group in &groups {
            let count = topology
                .subnets
                .iter()
                .filter(|s| s.az_index == az_index && s.group == *group)
                .count();
            if count != 1 {
                violations.push(Violation::new(
                    Rule::SubnetsPerZone,
                    format!(
                        "zone {} has {} subnet(s) of group '{}', expected 1",
                        topology.availability_zones[az_index], count, group
                    ),
                ));
            }
        }
    }

    for (i, subnet) in topology.subnets.iter().enumerate() {
        if !topology.cidr.contains(&subnet.cidr) {
            violations.push(Violation::new(
                Rule::SubnetAddressing,
                format!(
                    "subnet '{}' ({}) is outside the VPC block {}",
                    subnet.construct_id, subnet.cidr, topology.cidr
                ),
            ));
        }
        for other in &topology.subnets[i + 1..] {
            if subnet.cidr.overlaps(&other.cidr) {
                violations.push(Violation::new(
                    Rule::SubnetAddressing,
                    format!(
                        "subnets '{}' and '{}' overlap",
                        subnet.construct_id, other.construct_id
                    ),
                ));
            }
        }
    }

    violations
}

/// Checks on the web-server plan against the network it was resolved for.
pub fn check_web_server(plan: &WebServerPlan, topology: &NetworkTopology) -> Vec<Violation> {
    let mut violations = Vec::new();

    let public: Vec<&str> = topology
        .subnets_of(SubnetKind::Public)
        .map(|s| s.construct_id.as_str())
        .collect();
    let mut placed: Vec<&str> = plan.instances.iter().map(|i| i.subnet.as_str()).collect();
    placed.sort_unstable();
    let mut expected = public.clone();
    expected.sort_unstable();
    if placed != expected {
        violations.push(Violation::new(
            Rule::InstancePerPublicSubnet,
            format!(
                "{} instance(s) placed in [{}], expected one in each of [{}]",
                plan.instances.len(),
                placed.join(", "),
                public.join(", ")
            ),
        ));
    }

    let web = &plan.web_security_group;
    let db = &plan.database_security_group;
    if web.admits_group(&db.construct_id) {
        violations.push(Violation::new(
            Rule::SecurityGroupAsymmetry,
            format!(
                "'{}' admits traffic from '{}'",
                web.construct_id, db.construct_id
            ),
        ));
    }

    let port = plan.database.port();
    let web_peer = Peer::SecurityGroup(web.construct_id.clone());
    if db.rules.is_empty() {
        violations.push(Violation::new(
            Rule::DatabaseIngress,
            format!("'{}' admits nothing", db.construct_id),
        ));
    }
    for rule in &db.rules {
        if rule.peer != web_peer || rule.port != port {
            violations.push(Violation::new(
                Rule::DatabaseIngress,
                format!(
                    "'{}' admits port {} from {}, only port {} from '{}' is allowed",
                    db.construct_id, rule.port, rule.peer, port, web.construct_id
                ),
            ));
        }
    }

    if plan.database_subnets.is_empty() {
        violations.push(Violation::new(
            Rule::DatabasePlacement,
            "database has no subnets",
        ));
    }
    for id in &plan.database_subnets {
        match topology.subnet(id) {
            Some(subnet) if subnet.kind == SubnetKind::PrivateWithNat => {}
            Some(subnet) => violations.push(Violation::new(
                Rule::DatabasePlacement,
                format!("database placed in {} subnet '{}'", subnet.kind, id),
            )),
            None => violations.push(Violation::new(
                Rule::DatabasePlacement,
                format!("database placed in unknown subnet '{}'", id),
            )),
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn app() -> App {
        App::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_default_app_is_clean() {
        assert!(check(&app()).is_empty());
    }

    #[test]
    fn test_missing_instance_reported() {
        let app = app();
        let mut plan = app.web_server().plan().clone();
        plan.instances.pop();
        let violations = check_web_server(&plan, app.network().topology());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, Rule::InstancePerPublicSubnet);
    }

    #[test]
    fn test_reverse_rule_breaks_asymmetry() {
        let app = app();
        let mut plan = app.web_server().plan().clone();
        plan.web_security_group
            .add_ingress_rule(Peer::SecurityGroup("RDSSG".into()), 22);
        let violations = check_web_server(&plan, app.network().topology());
        assert!(violations
            .iter()
            .any(|v| v.rule == Rule::SecurityGroupAsymmetry));
    }

    #[test]
    fn test_database_open_to_internet_reported() {
        let app = app();
        let mut plan = app.web_server().plan().clone();
        plan.database_security_group
            .add_ingress_rule(Peer::AnyIpv4, 3306);
        let violations = check_web_server(&plan, app.network().topology());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, Rule::DatabaseIngress);
    }

    #[test]
    fn test_database_in_public_subnet_reported() {
        let app = app();
        let mut plan = app.web_server().plan().clone();
        plan.database_subnets = vec!["PublicSubnetSubnet1".into()];
        let violations = check_web_server(&plan, app.network().topology());
        assert_eq!(violations[0].rule, Rule::DatabasePlacement);
    }

    #[test]
    fn test_overlapping_subnets_reported() {
        let app = app();
        let mut topology = app.network().topology().clone();
        topology.subnets[1].cidr = topology.subnets[0].cidr;
        let violations = check_network(&topology);
        assert!(violations.iter().any(|v| v.rule == Rule::SubnetAddressing));
    }

    #[test]
    fn test_into_error_summarizes() {
        let err = into_error(&[Violation::new(Rule::DatabasePlacement, "x")]);
        assert_eq!(
            err.to_string(),
            "1 invariant violation(s): [database_placement] x"
        );
    }
}
