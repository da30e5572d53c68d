//! Network model: VPC address space, subnet plan, and the resolver that lays
//! subnets out across availability zones.
//!
//! # Example
//!
//! ```rust
//! use cloudlab::network::{resolve, AvailabilityZone, NetworkSpec};
//!
//! let spec = NetworkSpec::default();
//! let zones = AvailabilityZone::for_region(Some("us-east-1"), 2).unwrap();
//! let topology = resolve(&spec, zones).unwrap();
//!
//! assert_eq!(topology.public_subnets().len(), 2);
//! assert_eq!(topology.private_subnets().len(), 2);
//! ```

mod cidr;
mod topology;

pub use cidr::{
    ensure_mask_in_range, CidrAllocator, Ipv4Cidr, DEFAULT_VPC_CIDR, MAX_PREFIX, MIN_PREFIX,
};
pub use topology::{
    resolve, AvailabilityZone, NatGateway, NetworkSpec, NetworkTopology, Subnet, SubnetGroup,
    SubnetKind, MAX_AVAILABILITY_ZONES,
};
