//! The network stack: one VPC, its subnets, routing, and the exports other
//! stacks consume.

use crate::compute::availability_zone_value;
use crate::error::{Error, Result};
use crate::network::{resolve, AvailabilityZone, NetworkSpec, NetworkTopology, Subnet, SubnetKind};
use crate::security::ANY_IPV4;
use crate::template::intrinsic::{get_att, import_value, reference};
use crate::template::{ConstructPath, Resource, StackBuilder, Template};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Export names published by the network stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkExports {
    /// Export carrying the VPC id
    pub vpc_id: String,
    /// Export carrying each subnet id, by subnet construct id
    pub subnet_ids: IndexMap<String, String>,
}

impl NetworkExports {
    /// `Fn::ImportValue` of the VPC id.
    pub fn vpc_id_value(&self) -> Value {
        import_value(&self.vpc_id)
    }

    /// `Fn::ImportValue` of one subnet id.
    pub fn subnet_id_value(&self, subnet: &str) -> Result<Value> {
        self.subnet_ids
            .get(subnet)
            .map(|export| import_value(export))
            .ok_or_else(|| Error::DanglingReference {
                from: "imports".to_string(),
                to: subnet.to_string(),
            })
    }
}

/// A resolved network stack.
#[derive(Debug, Clone)]
pub struct NetworkStack {
    name: String,
    topology: NetworkTopology,
}

impl NetworkStack {
    /// Resolve `spec` against `zones`.
    pub fn new(
        name: impl Into<String>,
        spec: NetworkSpec,
        zones: Vec<AvailabilityZone>,
    ) -> Result<Self> {
        let topology = resolve(&spec, zones)?;
        Ok(Self {
            name: name.into(),
            topology,
        })
    }

    /// Stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved topology.
    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    /// Render the stack's template and the exports it publishes.
    #[instrument(skip(self), fields(stack = %self.name))]
    pub fn synthesize(&self) -> Result<(Template, NetworkExports)> {
        let mut stack = StackBuilder::new(&self.name);
        let topo = &self.topology;
        let vpc_path = stack.root().child(&topo.construct_id);

        let vpc = stack.add_resource(
            &vpc_path.child("Resource"),
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": topo.cidr.to_string(),
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                    "Tags": [name_tag(&vpc_path)]
                }),
            ),
        )?;

        // Gateway ids are fixed by path, so routes can name them before the
        // gateway resources are added.
        let igw = vpc_path.child("IGW").logical_id();
        let igw_attachment = vpc_path.child("VPCGW").logical_id();

        let mut subnet_ids = IndexMap::new();
        let mut nat_ids: HashMap<usize, String> = HashMap::new();
        let ordered = topo
            .subnets_of(SubnetKind::Public)
            .chain(topo.subnets_of(SubnetKind::PrivateWithNat));

        for subnet in ordered {
            let subnet_path = vpc_path.child(&subnet.construct_id);
            let ids = add_subnet(&mut stack, &subnet_path, subnet, &vpc)?;

            let route = match subnet.kind {
                SubnetKind::Public => {
                    Resource::new(
                        "AWS::EC2::Route",
                        json!({
                            "DestinationCidrBlock": ANY_IPV4,
                            "GatewayId": reference(&igw),
                            "RouteTableId": reference(&ids.route_table)
                        }),
                    )
                    .depends_on(&igw_attachment)
                }
                SubnetKind::PrivateWithNat => {
                    let nat = topo
                        .nat_gateway_for(subnet.az_index)
                        .and_then(|n| nat_ids.get(&n.az_index))
                        .ok_or_else(|| {
                            Error::NatPlacement(format!(
                                "no NAT gateway available for subnet '{}'",
                                subnet.construct_id
                            ))
                        })?;
                    Resource::new(
                        "AWS::EC2::Route",
                        json!({
                            "DestinationCidrBlock": ANY_IPV4,
                            "NatGatewayId": reference(nat),
                            "RouteTableId": reference(&ids.route_table)
                        }),
                    )
                }
            };
            let default_route = stack.add_resource(&subnet_path.child("DefaultRoute"), route)?;

            if topo
                .nat_gateways
                .iter()
                .any(|n| n.subnet == subnet.construct_id)
            {
                let eip = stack.add_resource(
                    &subnet_path.child("EIP"),
                    Resource::new(
                        "AWS::EC2::EIP",
                        json!({ "Domain": "vpc", "Tags": [name_tag(&subnet_path)] }),
                    ),
                )?;
                let nat = stack.add_resource(
                    &subnet_path.child("NATGateway"),
                    Resource::new(
                        "AWS::EC2::NatGateway",
                        json!({
                            "AllocationId": get_att(&eip, "AllocationId"),
                            "SubnetId": reference(&ids.subnet),
                            "Tags": [name_tag(&subnet_path)]
                        }),
                    )
                    .depends_on(&default_route)
                    .depends_on(&ids.association),
                )?;
                nat_ids.insert(subnet.az_index, nat);
            }

            subnet_ids.insert(subnet.construct_id.clone(), ids.subnet);
        }

        if topo.internet_gateway {
            stack.add_resource(
                &vpc_path.child("IGW"),
                Resource::new(
                    "AWS::EC2::InternetGateway",
                    json!({ "Tags": [name_tag(&vpc_path)] }),
                ),
            )?;
            stack.add_resource(
                &vpc_path.child("VPCGW"),
                Resource::new(
                    "AWS::EC2::VPCGatewayAttachment",
                    json!({
                        "InternetGatewayId": reference(&igw),
                        "VpcId": reference(&vpc)
                    }),
                ),
            )?;
        }

        let mut exports = NetworkExports {
            vpc_id: stack.export_ref(&vpc)?,
            subnet_ids: IndexMap::new(),
        };
        for (construct_id, logical_id) in subnet_ids {
            let export = stack.export_ref(&logical_id)?;
            exports.subnet_ids.insert(construct_id, export);
        }

        let template = stack.build()?;
        info!(
            resources = template.resources.len(),
            exports = template.outputs.len(),
            "network stack synthesized"
        );
        Ok((template, exports))
    }
}

struct SubnetIds {
    subnet: String,
    route_table: String,
    association: String,
}

fn add_subnet(
    stack: &mut StackBuilder,
    path: &ConstructPath,
    subnet: &Subnet,
    vpc: &str,
) -> Result<SubnetIds> {
    let subnet_id = stack.add_resource(
        &path.child("Subnet"),
        Resource::new(
            "AWS::EC2::Subnet",
            json!({
                "AvailabilityZone": availability_zone_value(&subnet.availability_zone),
                "CidrBlock": subnet.cidr.to_string(),
                "MapPublicIpOnLaunch": subnet.kind == SubnetKind::Public,
                "Tags": [
                    { "Key": "aws-cdk:subnet-name", "Value": subnet.group },
                    { "Key": "aws-cdk:subnet-type", "Value": subnet.kind.tag_value() },
                    name_tag(path)
                ],
                "VpcId": reference(vpc)
            }),
        ),
    )?;

    let route_table = stack.add_resource(
        &path.child("RouteTable"),
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({ "Tags": [name_tag(path)], "VpcId": reference(vpc) }),
        ),
    )?;

    let association = stack.add_resource(
        &path.child("RouteTableAssociation"),
        Resource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": reference(&route_table),
                "SubnetId": reference(&subnet_id)
            }),
        ),
    )?;

    Ok(SubnetIds {
        subnet: subnet_id,
        route_table,
        association,
    })
}

fn name_tag(path: &ConstructPath) -> Value {
    json!({ "Key": "Name", "Value": path.to_string() })
}
