//! Integration tests for the network stack
//!
//! These tests cover:
//! - Subnet layout of the default scenario
//! - Fixed and remaining-space masks
//! - NAT gateway placement and routing
//! - Exports consumed by the web-server stack

use cloudlab::network::{
    resolve, AvailabilityZone, NetworkSpec, SubnetGroup, SubnetKind, DEFAULT_VPC_CIDR,
};
use cloudlab::stacks::NetworkStack;
use cloudlab::Error;
use pretty_assertions::assert_eq;

fn zones(count: u8) -> Vec<AvailabilityZone> {
    AvailabilityZone::for_region(Some("us-east-1"), count).unwrap()
}

fn cidrs(spec: &NetworkSpec, count: u8) -> Vec<String> {
    resolve(spec, zones(count))
        .unwrap()
        .subnets
        .iter()
        .map(|s| s.cidr.to_string())
        .collect()
}

// ============================================================================
// Address Layout Tests
// ============================================================================

#[test]
fn test_default_scenario_cidrs() {
    assert_eq!(
        cidrs(&NetworkSpec::default(), 2),
        vec![
            "10.0.0.0/18",
            "10.0.64.0/18",
            "10.0.128.0/18",
            "10.0.192.0/18"
        ]
    );
}

#[test]
fn test_default_scenario_subnets_per_zone() {
    let topology = resolve(&NetworkSpec::default(), zones(2)).unwrap();
    for az in 0..2 {
        let kinds: Vec<SubnetKind> = topology
            .subnets
            .iter()
            .filter(|s| s.az_index == az)
            .map(|s| s.kind)
            .collect();
        assert_eq!(kinds, vec![SubnetKind::Public, SubnetKind::PrivateWithNat]);
    }
    assert_eq!(
        topology.public_subnets()[1].availability_zone,
        AvailabilityZone::Named("us-east-1b".into())
    );
}

#[test]
fn test_three_zones_share_remaining_space() {
    // 6 subnets: floor(log2(65536 / 6)) = 13 bits -> /19
    assert_eq!(
        cidrs(&NetworkSpec::default(), 3),
        vec![
            "10.0.0.0/19",
            "10.0.32.0/19",
            "10.0.64.0/19",
            "10.0.96.0/19",
            "10.0.128.0/19",
            "10.0.160.0/19"
        ]
    );
}

#[test]
fn test_fixed_mask_groups() {
    let spec = NetworkSpec {
        subnet_plan: vec![
            SubnetGroup::public("Public").with_cidr_mask(24),
            SubnetGroup::private_with_nat("App").with_cidr_mask(24),
        ],
        ..NetworkSpec::default()
    };
    assert_eq!(
        cidrs(&spec, 2),
        vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]
    );
}

#[test]
fn test_mixed_masks_fixed_first() {
    let spec = NetworkSpec {
        subnet_plan: vec![
            SubnetGroup::public("Public"),
            SubnetGroup::private_with_nat("App").with_cidr_mask(20),
        ],
        ..NetworkSpec::default()
    };
    let topology = resolve(&spec, zones(2)).unwrap();
    let app: Vec<String> = topology
        .subnets
        .iter()
        .filter(|s| s.group == "App")
        .map(|s| s.cidr.to_string())
        .collect();
    assert_eq!(app, vec!["10.0.0.0/20", "10.0.16.0/20"]);

    // 57344 addresses left for 2 subnets: /18, aligned past the /20s
    let public: Vec<String> = topology
        .public_subnets()
        .iter()
        .map(|s| s.cidr.to_string())
        .collect();
    assert_eq!(public, vec!["10.0.64.0/18", "10.0.128.0/18"]);
    for subnet in topology.public_subnets() {
        assert!(DEFAULT_VPC_CIDR.contains(&subnet.cidr));
    }
}

#[test]
fn test_too_many_azs_rejected() {
    let spec = NetworkSpec {
        availability_zone_count: 7,
        ..NetworkSpec::default()
    };
    assert!(matches!(
        spec.validate(),
        Err(Error::InvalidAzCount { count: 7, .. })
    ));
}

// ============================================================================
// Synthesized Template Tests
// ============================================================================

#[test]
fn test_network_stack_template() {
    let stack = NetworkStack::new("CdkLabNetworkStack", NetworkSpec::default(), zones(2)).unwrap();
    let (template, exports) = stack.synthesize().unwrap();

    assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 4);
    assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 2);
    assert_eq!(template.count_of_type("AWS::EC2::InternetGateway"), 1);

    let public_subnets: Vec<_> = template
        .resources_of_type("AWS::EC2::Subnet")
        .filter(|(_, r)| r.properties["MapPublicIpOnLaunch"] == true)
        .collect();
    assert_eq!(public_subnets.len(), 2);

    for (_, output) in &template.outputs {
        let export = output.export.as_ref().unwrap();
        assert!(export.name.starts_with("CdkLabNetworkStack:ExportsOutputRef"));
    }
    assert_eq!(exports.subnet_ids.len(), 4);
}

#[test]
fn test_nat_gateways_live_in_public_subnets() {
    let stack = NetworkStack::new("Net", NetworkSpec::default(), zones(2)).unwrap();
    let topology = stack.topology();
    for nat in &topology.nat_gateways {
        let host = topology.subnet(&nat.subnet).unwrap();
        assert_eq!(host.kind, SubnetKind::Public);
        assert_eq!(host.az_index, nat.az_index);
    }
}

#[test]
fn test_single_nat_serves_every_zone() {
    let spec = NetworkSpec {
        nat_gateways: Some(1),
        ..NetworkSpec::default()
    };
    let stack = NetworkStack::new("Net", spec, zones(3)).unwrap();
    let (template, _) = stack.synthesize().unwrap();
    assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 1);

    let (nat_id, _) = template
        .resources_of_type("AWS::EC2::NatGateway")
        .next()
        .unwrap();
    let nat_routes = template
        .resources_of_type("AWS::EC2::Route")
        .filter(|(_, r)| r.properties["NatGatewayId"]["Ref"] == nat_id.as_str())
        .count();
    assert_eq!(nat_routes, 3);
}
