//! Error types for Cloudlab.
//!
//! Every stack description that cannot be turned into a deployable template is
//! rejected at synthesis time with one of these variants. Provider-side
//! failures (quotas, engine compatibility) only surface through the
//! deployment engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Cloudlab operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Cloudlab.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Network Errors
    // ========================================================================
    /// Malformed CIDR notation.
    #[error("Invalid CIDR block '{cidr}': {message}")]
    InvalidCidr {
        /// The offending CIDR text
        cidr: String,
        /// What is wrong with it
        message: String,
    },

    /// Prefix length outside the range accepted for VPCs and subnets.
    #[error("Prefix /{prefix} is outside the allowed range /{min}../{max}")]
    PrefixOutOfRange {
        /// Requested prefix length
        prefix: u8,
        /// Smallest allowed prefix
        min: u8,
        /// Largest allowed prefix
        max: u8,
    },

    /// The subnet plan has no groups.
    #[error("Subnet plan for '{0}' must contain at least one subnet group")]
    EmptySubnetPlan(String),

    /// Two subnet groups share a name.
    #[error("Duplicate subnet group name '{0}'")]
    DuplicateSubnetGroup(String),

    /// Not enough addresses left in the VPC block.
    #[error("Address block {block} cannot fit {requested} more subnet(s) of /{mask}")]
    AddressSpaceExhausted {
        /// VPC address block
        block: String,
        /// Mask of the subnet that did not fit
        mask: u8,
        /// Number of subnets still requested
        requested: usize,
    },

    /// Unusable availability zone count.
    #[error("Availability zone count must be between 1 and {max}, got {count}")]
    InvalidAzCount {
        /// Requested count
        count: u8,
        /// Largest supported count
        max: u8,
    },

    /// Zone list that does not match the requested count.
    #[error("Expected {expected} availability zone(s), but {actual} were supplied")]
    AzCountMismatch {
        /// Count the network asks for
        expected: u8,
        /// Zones actually supplied
        actual: usize,
    },

    /// NAT gateway placement impossible.
    #[error("NAT gateway placement failed: {0}")]
    NatPlacement(String),

    /// A resource needs subnets of a kind the network does not have.
    #[error("Network '{network}' has no {kind} subnets")]
    NoSubnetsOfKind {
        /// Network construct id
        network: String,
        /// Subnet kind that was requested
        kind: String,
    },

    // ========================================================================
    // Compute and Database Errors
    // ========================================================================
    /// Instance type does not look like `family.size`.
    #[error("Invalid instance type '{0}'")]
    InvalidInstanceType(String),

    /// Storage bounds rejected.
    #[error("Invalid storage for database '{database}': {message}")]
    InvalidStorage {
        /// Database construct id
        database: String,
        /// Error message
        message: String,
    },

    /// Engine version rejected.
    #[error("Invalid {engine} engine version '{version}'")]
    InvalidEngineVersion {
        /// Engine name
        engine: String,
        /// Requested version
        version: String,
    },

    /// Database name rejected.
    #[error("Invalid database name '{0}': must start with a letter, be alphanumeric and at most 64 characters")]
    InvalidDatabaseName(String),

    // ========================================================================
    // Synthesis Errors
    // ========================================================================
    /// A logical ID was used twice in one template.
    #[error("Duplicate logical ID '{logical_id}' in stack '{stack}'")]
    DuplicateLogicalId {
        /// Stack name
        stack: String,
        /// Colliding logical ID
        logical_id: String,
    },

    /// A resource references something that is not in the template.
    #[error("Resource '{from}' references unknown resource '{to}'")]
    DanglingReference {
        /// Referencing resource
        from: String,
        /// Missing target
        to: String,
    },

    /// Resources reference each other in a loop.
    #[error("Dependency cycle between resources: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Stack not part of the app.
    #[error("Stack '{0}' not found")]
    StackNotFound(String),

    /// Synthesized topology broke one of its invariants.
    #[error("{count} invariant violation(s): {summary}")]
    InvariantViolation {
        /// Number of violations
        count: usize,
        /// Joined violation messages
        summary: String,
    },

    // ========================================================================
    // Deployment Errors
    // ========================================================================
    /// The deployment engine rejected a stack.
    #[error("Deployment of stack '{stack}' failed: {message}")]
    DeploymentFailed {
        /// Stack name
        stack: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Creates a new invalid CIDR error.
    pub fn invalid_cidr(cidr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid storage error.
    pub fn invalid_storage(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidStorage {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvariantViolation { .. } => 2,
            Error::DeploymentFailed { .. } => 3,
            Error::Config(_) | Error::InvalidConfig { .. } => 4,
            Error::FileNotFound(_) | Error::Io(_) => 5,
            _ => 1,
        }
    }
}
