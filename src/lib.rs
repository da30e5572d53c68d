//! # Cloudlab - Network and Web-Server Stacks as Code
//!
//! Cloudlab declares two AWS stacks and synthesizes them into CloudFormation
//! templates:
//!
//! - a **network stack**: a VPC with public and private-with-NAT subnets
//!   spread over availability zones, internet and NAT gateways, routing,
//!   and exports of the VPC and subnet ids;
//! - a **web-server stack**: an SSM-managed instance role, a web security
//!   group open on HTTP, one instance per public subnet, and a MySQL
//!   database in the private subnets reachable only from the web servers.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │   Config     │────▶│       App        │────▶│  CloudAssembly   │
//! │ (toml/yaml)  │     │ network ▸ web    │     │ (cdk.out/*.json) │
//! └──────────────┘     └──────────────────┘     └──────────────────┘
//!                               │                        │
//!                 ┌─────────────┼──────────┐             ▼
//!                 ▼             ▼          ▼     ┌──────────────────┐
//!          ┌───────────┐ ┌───────────┐ ┌───────┐ │ DeploymentEngine │
//!          │ topology  │ │ template  │ │ graph │ │ (dry run / diff) │
//!          └───────────┘ └───────────┘ └───────┘ └──────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust
//! use cloudlab::prelude::*;
//!
//! let app = App::from_config(&Config::default()).unwrap();
//! let assembly = app.synthesize().unwrap();
//!
//! let web = assembly.stack("CdkLabWebServerStack").unwrap();
//! assert_eq!(web.template.count_of_type("AWS::EC2::Instance"), 2);
//! assert_eq!(web.template.count_of_type("AWS::RDS::DBInstance"), 1);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::config::Config;
    pub use crate::deploy::{deploy_app, DeploymentEngine, DryRunEngine, ResourceAction};
    pub use crate::diff::TemplateDiff;
    pub use crate::error::{Error, Result};
    pub use crate::network::{NetworkSpec, NetworkTopology, SubnetGroup, SubnetKind};
    pub use crate::stacks::{App, Environment, NetworkStack, WebServerConfig, WebServerStack};
    pub use crate::synth::{CloudAssembly, StackArtifact};
    pub use crate::template::Template;
}

/// Error types.
pub mod error;

/// Configuration loading: files, environment overrides, defaults.
pub mod config;

/// VPC address space and subnet topology.
pub mod network;

/// CloudFormation template model, logical IDs and intrinsics.
pub mod template;

/// Resource dependency graph.
pub mod graph;

pub mod compute;
pub mod database;
pub mod iam;
pub mod security;

/// The network and web-server stacks.
pub mod stacks;

/// Structural invariants of the resolved stacks.
pub mod invariants;

/// Writing and reading the cloud assembly.
pub mod synth;

pub mod diff;

/// Deployment engines.
pub mod deploy;

pub use error::{Error, Result};

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of Cloudlab.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
