//! Subnet topology resolution.
//!
//! Turns a [`NetworkSpec`] into a concrete [`NetworkTopology`]: one subnet per
//! plan group and availability zone, address blocks carved out of the VPC
//! block, and NAT gateway placement for the private subnets.

use super::cidr::{ensure_mask_in_range, CidrAllocator, Ipv4Cidr, DEFAULT_VPC_CIDR};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, instrument};

/// Availability zones addressable by letter suffix.
pub const MAX_AVAILABILITY_ZONES: u8 = 6;

/// Routing class of a subnet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// Routes to an internet gateway, instances get public addresses
    Public,
    /// Outbound-only access through a NAT gateway
    #[serde(alias = "private_nat", alias = "private")]
    PrivateWithNat,
}

impl SubnetKind {
    /// Value of the `aws-cdk:subnet-type` tag.
    pub fn tag_value(&self) -> &'static str {
        match self {
            SubnetKind::Public => "Public",
            SubnetKind::PrivateWithNat => "Private",
        }
    }

    /// Snake-case name used in configuration and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetKind::Public => "public",
            SubnetKind::PrivateWithNat => "private_with_nat",
        }
    }
}

impl fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the subnet plan: a named group replicated in every AZ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetGroup {
    /// Group name, prefix of each subnet's construct id
    pub name: String,
    /// Routing class
    pub kind: SubnetKind,
    /// Fixed mask; groups without one share the space left over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_mask: Option<u8>,
}

impl SubnetGroup {
    /// A public group sized from the remaining space.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubnetKind::Public,
            cidr_mask: None,
        }
    }

    /// A private-with-NAT group sized from the remaining space.
    pub fn private_with_nat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubnetKind::PrivateWithNat,
            cidr_mask: None,
        }
    }

    /// Pin the group's subnets to a fixed mask.
    pub fn with_cidr_mask(mut self, mask: u8) -> Self {
        self.cidr_mask = Some(mask);
        self
    }
}

/// Address space and subnet topology of a VPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Construct id of the VPC inside its stack
    pub construct_id: String,
    /// VPC address block
    pub address_block: Ipv4Cidr,
    /// Subnet groups, in allocation order
    pub subnet_plan: Vec<SubnetGroup>,
    /// Number of AZs to spread across
    pub availability_zone_count: u8,
    /// NAT gateways to create; defaults to one per AZ
    pub nat_gateways: Option<u8>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            construct_id: "cdk_lab_vpc".to_string(),
            address_block: DEFAULT_VPC_CIDR,
            subnet_plan: vec![
                SubnetGroup::public("PublicSubnet"),
                SubnetGroup::private_with_nat("PrivateSubnet"),
            ],
            availability_zone_count: 2,
            nat_gateways: None,
        }
    }
}

impl NetworkSpec {
    /// Check everything that can be checked without allocating addresses.
    pub fn validate(&self) -> Result<()> {
        if self.subnet_plan.is_empty() {
            return Err(Error::EmptySubnetPlan(self.construct_id.clone()));
        }

        let mut seen = HashSet::new();
        for group in &self.subnet_plan {
            if !seen.insert(group.name.as_str()) {
                return Err(Error::DuplicateSubnetGroup(group.name.clone()));
            }
            if let Some(mask) = group.cidr_mask {
                ensure_mask_in_range(mask)?;
                if mask < self.address_block.prefix() {
                    return Err(Error::invalid_cidr(
                        format!("/{}", mask),
                        format!(
                            "subnet group '{}' is larger than the VPC block {}",
                            group.name, self.address_block
                        ),
                    ));
                }
            }
        }

        if self.availability_zone_count == 0
            || self.availability_zone_count > MAX_AVAILABILITY_ZONES
        {
            return Err(Error::InvalidAzCount {
                count: self.availability_zone_count,
                max: MAX_AVAILABILITY_ZONES,
            });
        }

        self.address_block.ensure_prefix_in_range()?;

        let has_public = self.has_kind(SubnetKind::Public);
        let has_private = self.has_kind(SubnetKind::PrivateWithNat);
        if has_private && !has_public {
            return Err(Error::NatPlacement(
                "private_with_nat subnets need a public subnet group to hold the NAT gateways"
                    .to_string(),
            ));
        }
        if has_private && self.nat_gateways == Some(0) {
            return Err(Error::NatPlacement(
                "nat_gateways = 0 leaves private_with_nat subnets without a route out".to_string(),
            ));
        }
        if !has_private && self.nat_gateways.unwrap_or(0) > 0 {
            return Err(Error::NatPlacement(
                "NAT gateways requested but the plan has no private_with_nat subnets".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of NAT gateways the resolved network will carry.
    pub fn nat_gateway_count(&self) -> usize {
        if !self.has_kind(SubnetKind::PrivateWithNat) {
            return 0;
        }
        let azs = self.availability_zone_count;
        usize::from(self.nat_gateways.unwrap_or(azs).min(azs))
    }

    fn has_kind(&self, kind: SubnetKind) -> bool {
        self.subnet_plan.iter().any(|g| g.kind == kind)
    }
}

/// Availability zone reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AvailabilityZone {
    /// Concrete zone name, e.g. `us-east-1a`
    Named(String),
    /// N-th zone of whatever region the stack lands in
    Indexed(u8),
}

impl AvailabilityZone {
    /// Zones for `count` AZs: named after `region` when it is known.
    pub fn for_region(region: Option<&str>, count: u8) -> Result<Vec<AvailabilityZone>> {
        if count == 0 || count > MAX_AVAILABILITY_ZONES {
            return Err(Error::InvalidAzCount {
                count,
                max: MAX_AVAILABILITY_ZONES,
            });
        }
        Ok((0..count)
            .map(|i| match region {
                Some(region) => {
                    AvailabilityZone::Named(format!("{}{}", region, char::from(b'a' + i)))
                }
                None => AvailabilityZone::Indexed(i),
            })
            .collect())
    }
}

impl fmt::Display for AvailabilityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityZone::Named(name) => f.write_str(name),
            AvailabilityZone::Indexed(i) => write!(f, "az[{}]", i),
        }
    }
}

/// A resolved subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Construct id, `<group>Subnet<n>`
    pub construct_id: String,
    /// Plan group this subnet belongs to
    pub group: String,
    /// Routing class
    pub kind: SubnetKind,
    /// Address block
    pub cidr: Ipv4Cidr,
    /// Index into the topology's availability zones
    pub az_index: usize,
    /// Zone the subnet lives in
    pub availability_zone: AvailabilityZone,
}

/// A NAT gateway and the public subnet hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatGateway {
    /// Zone index the gateway serves
    pub az_index: usize,
    /// Construct id of the hosting public subnet
    pub subnet: String,
}

/// The fully resolved network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    /// Construct id of the VPC
    pub construct_id: String,
    /// VPC address block
    pub cidr: Ipv4Cidr,
    /// Zones in use
    pub availability_zones: Vec<AvailabilityZone>,
    /// Subnets in allocation order
    pub subnets: Vec<Subnet>,
    /// NAT gateways, at most one per zone
    pub nat_gateways: Vec<NatGateway>,
    /// Whether an internet gateway is attached
    pub internet_gateway: bool,
}

impl NetworkTopology {
    /// Subnets of one kind, in allocation order.
    pub fn subnets_of(&self, kind: SubnetKind) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }

    /// Public subnets.
    pub fn public_subnets(&self) -> Vec<&Subnet> {
        self.subnets_of(SubnetKind::Public).collect()
    }

    /// Private-with-NAT subnets.
    pub fn private_subnets(&self) -> Vec<&Subnet> {
        self.subnets_of(SubnetKind::PrivateWithNat).collect()
    }

    /// Look up a subnet by construct id.
    pub fn subnet(&self, construct_id: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.construct_id == construct_id)
    }

    /// NAT gateway a private subnet in `az_index` routes through: the one in
    /// the same zone, else the first one.
    pub fn nat_gateway_for(&self, az_index: usize) -> Option<&NatGateway> {
        self.nat_gateways
            .iter()
            .find(|n| n.az_index == az_index)
            .or_else(|| self.nat_gateways.first())
    }
}

/// Resolve a network spec against a list of zones.
#[instrument(skip_all, fields(vpc = %spec.construct_id, cidr = %spec.address_block))]
pub fn resolve(spec: &NetworkSpec, zones: Vec<AvailabilityZone>) -> Result<NetworkTopology> {
    spec.validate()?;
    if zones.len() != usize::from(spec.availability_zone_count) {
        return Err(Error::AzCountMismatch {
            expected: spec.availability_zone_count,
            actual: zones.len(),
        });
    }

    let mut allocator = CidrAllocator::new(spec.address_block);
    let mut subnets = Vec::with_capacity(spec.subnet_plan.len() * zones.len());

    // Fixed-mask groups first, in plan order.
    let (fixed, sized): (Vec<&SubnetGroup>, Vec<&SubnetGroup>) =
        spec.subnet_plan.iter().partition(|g| g.cidr_mask.is_some());

    for group in fixed {
        let mask = group.cidr_mask.unwrap_or(spec.address_block.prefix());
        place_group(group, mask, &zones, &mut allocator, &mut subnets)?;
    }

    if !sized.is_empty() {
        let count = sized.len() * zones.len();
        let mask = allocator.mask_for_remaining(count)?;
        debug!(count, mask, "splitting remaining address space");
        ensure_mask_in_range(mask).map_err(|_| Error::AddressSpaceExhausted {
            block: spec.address_block.to_string(),
            mask,
            requested: count,
        })?;
        for group in sized {
            place_group(group, mask, &zones, &mut allocator, &mut subnets)?;
        }
    }

    // Allocation order differs from plan order when masks are mixed.
    subnets.sort_by_key(|s| {
        spec.subnet_plan
            .iter()
            .position(|g| g.name == s.group)
            .unwrap_or(usize::MAX)
    });

    let nat_gateways = match spec
        .subnet_plan
        .iter()
        .find(|g| g.kind == SubnetKind::Public)
    {
        Some(host_group) => subnets
            .iter()
            .filter(|s| s.group == host_group.name)
            .take(spec.nat_gateway_count())
            .map(|s| NatGateway {
                az_index: s.az_index,
                subnet: s.construct_id.clone(),
            })
            .collect(),
        None => Vec::new(),
    };

    let topology = NetworkTopology {
        construct_id: spec.construct_id.clone(),
        cidr: spec.address_block,
        internet_gateway: subnets.iter().any(|s| s.kind == SubnetKind::Public),
        availability_zones: zones,
        subnets,
        nat_gateways,
    };

    debug!(
        subnets = topology.subnets.len(),
        nat_gateways = topology.nat_gateways.len(),
        "network resolved"
    );
    Ok(topology)
}

fn place_group(
    group: &SubnetGroup,
    mask: u8,
    zones: &[AvailabilityZone],
    allocator: &mut CidrAllocator,
    subnets: &mut Vec<Subnet>,
) -> Result<()> {
    for (az_index, zone) in zones.iter().enumerate() {
        let cidr = allocator.allocate(mask)?;
        subnets.push(Subnet {
            construct_id: format!("{}Subnet{}", group.name, az_index + 1),
            group: group.name.clone(),
            kind: group.kind,
            cidr,
            az_index,
            availability_zone: zone.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(n: u8) -> Vec<AvailabilityZone> {
        AvailabilityZone::for_region(Some("us-east-1"), n).unwrap()
    }

    #[test]
    fn test_default_plan_two_azs() {
        let spec = NetworkSpec::default();
        let topo = resolve(&spec, zones(2)).unwrap();

        let cidrs: Vec<String> = topo.subnets.iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(
            cidrs,
            vec![
                "10.0.0.0/18",
                "10.0.64.0/18",
                "10.0.128.0/18",
                "10.0.192.0/18"
            ]
        );
        assert_eq!(topo.public_subnets().len(), 2);
        assert_eq!(topo.private_subnets().len(), 2);
        assert_eq!(topo.subnets[0].construct_id, "PublicSubnetSubnet1");
        assert_eq!(topo.subnets[3].construct_id, "PrivateSubnetSubnet2");
        assert!(topo.internet_gateway);
    }

    #[test]
    fn test_nat_gateways_default_one_per_az() {
        let topo = resolve(&NetworkSpec::default(), zones(2)).unwrap();
        assert_eq!(topo.nat_gateways.len(), 2);
        assert_eq!(topo.nat_gateways[1].subnet, "PublicSubnetSubnet2");
        assert_eq!(topo.nat_gateway_for(1).unwrap().az_index, 1);
    }

    #[test]
    fn test_single_nat_gateway_shared() {
        let spec = NetworkSpec {
            nat_gateways: Some(1),
            ..NetworkSpec::default()
        };
        let topo = resolve(&spec, zones(2)).unwrap();
        assert_eq!(topo.nat_gateways.len(), 1);
        assert_eq!(topo.nat_gateway_for(1).unwrap().az_index, 0);
    }

    #[test]
    fn test_fixed_masks_allocated_first() {
        let spec = NetworkSpec {
            subnet_plan: vec![
                SubnetGroup::public("Ingress"),
                SubnetGroup::private_with_nat("App").with_cidr_mask(24),
            ],
            ..NetworkSpec::default()
        };
        let topo = resolve(&spec, zones(2)).unwrap();
        let app: Vec<String> = topo
            .subnets
            .iter()
            .filter(|s| s.group == "App")
            .map(|s| s.cidr.to_string())
            .collect();
        assert_eq!(app, vec!["10.0.0.0/24", "10.0.1.0/24"]);
        let ingress: Vec<&Subnet> = topo.public_subnets();
        assert!(ingress.iter().all(|s| !s.cidr.overlaps(&"10.0.0.0/23".parse().unwrap())));
    }

    #[test]
    fn test_empty_plan_rejected() {
        let spec = NetworkSpec {
            subnet_plan: vec![],
            ..NetworkSpec::default()
        };
        assert!(matches!(
            resolve(&spec, zones(2)),
            Err(Error::EmptySubnetPlan(_))
        ));
    }

    #[test]
    fn test_private_without_public_rejected() {
        let spec = NetworkSpec {
            subnet_plan: vec![SubnetGroup::private_with_nat("Only")],
            ..NetworkSpec::default()
        };
        assert!(matches!(spec.validate(), Err(Error::NatPlacement(_))));
    }

    #[test]
    fn test_zero_nat_with_private_rejected() {
        let spec = NetworkSpec {
            nat_gateways: Some(0),
            ..NetworkSpec::default()
        };
        assert!(matches!(spec.validate(), Err(Error::NatPlacement(_))));
    }

    #[test]
    fn test_public_only_has_no_nat() {
        let spec = NetworkSpec {
            subnet_plan: vec![SubnetGroup::public("Web")],
            availability_zone_count: 3,
            ..NetworkSpec::default()
        };
        let topo = resolve(&spec, zones(3)).unwrap();
        assert!(topo.nat_gateways.is_empty());
        assert_eq!(topo.public_subnets().len(), 3);
    }

    #[test]
    fn test_small_block_exhausted() {
        let spec = NetworkSpec {
            address_block: "10.0.0.0/28".parse().unwrap(),
            ..NetworkSpec::default()
        };
        assert!(matches!(
            resolve(&spec, zones(2)),
            Err(Error::AddressSpaceExhausted { .. })
        ));
    }

    #[test]
    fn test_zone_naming() {
        let named = AvailabilityZone::for_region(Some("eu-west-1"), 3).unwrap();
        assert_eq!(named[2], AvailabilityZone::Named("eu-west-1c".into()));
        let indexed = AvailabilityZone::for_region(None, 2).unwrap();
        assert_eq!(indexed[1], AvailabilityZone::Indexed(1));
        assert!(AvailabilityZone::for_region(None, 7).is_err());
    }

    #[test]
    fn test_subnets_keep_plan_order_with_mixed_masks() {
        let spec = NetworkSpec {
            subnet_plan: vec![
                SubnetGroup::public("Ingress"),
                SubnetGroup::public("Mgmt").with_cidr_mask(24),
                SubnetGroup::private_with_nat("App"),
            ],
            ..NetworkSpec::default()
        };
        let topo = resolve(&spec, zones(2)).unwrap();
        let ids: Vec<&str> = topo.subnets.iter().map(|s| s.construct_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "IngressSubnet1",
                "IngressSubnet2",
                "MgmtSubnet1",
                "MgmtSubnet2",
                "AppSubnet1",
                "AppSubnet2"
            ]
        );
        // Mgmt is still carved first.
        assert_eq!(topo.subnet("MgmtSubnet1").unwrap().cidr.to_string(), "10.0.0.0/24");
        assert_eq!(topo.nat_gateways[0].subnet, "IngressSubnet1");
    }

    #[test]
    fn test_zone_list_must_match_count() {
        let err = resolve(&NetworkSpec::default(), zones(3)).unwrap_err();
        assert!(matches!(
            err,
            Error::AzCountMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(
            err.to_string(),
            "Expected 2 availability zone(s), but 3 were supplied"
        );
    }
}
