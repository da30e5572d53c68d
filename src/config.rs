//! Configuration module for Cloudlab
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values (the two stacks exactly as the lab defines them)
//! - User configuration (~/.config/cloudlab/cloudlab.toml)
//! - Project configuration (./cloudlab.toml)
//! - Environment variables
//! - Command-line arguments

use crate::compute::InstanceType;
use crate::database::DatabaseSpec;
use crate::error::{Error, Result};
use crate::iam::SSM_MANAGED_INSTANCE_CORE;
use crate::network::{Ipv4Cidr, NetworkSpec, SubnetGroup, DEFAULT_VPC_CIDR};
use crate::stacks::{Environment, WebServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "cloudlab.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target account and region
    pub environment: Environment,

    /// Output settings
    pub app: AppConfig,

    /// Network stack settings
    pub network: NetworkConfig,

    /// Web-server stack settings
    pub web_server: WebServerSection,

    /// Database settings
    pub database: DatabaseConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            app: AppConfig::default(),
            network: NetworkConfig::default(),
            web_server: WebServerSection::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cloud assembly directory
    pub output_dir: PathBuf,

    /// Colored terminal output
    pub color: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("cdk.out"),
            color: true,
        }
    }
}

/// Network stack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Stack name
    pub stack_name: String,

    /// Construct id of the VPC
    pub vpc_id: String,

    /// VPC address block
    pub cidr: Ipv4Cidr,

    /// Availability zones to spread across
    pub max_azs: u8,

    /// NAT gateway count, one per AZ when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateways: Option<u8>,

    /// Subnet groups
    pub subnets: Vec<SubnetGroup>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let spec = NetworkSpec::default();
        Self {
            stack_name: "CdkLabNetworkStack".to_string(),
            vpc_id: spec.construct_id,
            cidr: DEFAULT_VPC_CIDR,
            max_azs: spec.availability_zone_count,
            nat_gateways: spec.nat_gateways,
            subnets: spec.subnet_plan,
        }
    }
}

/// Web-server stack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServerSection {
    /// Stack name
    pub stack_name: String,

    /// Instance type of the web servers
    pub instance_type: InstanceType,

    /// Port opened to the internet
    pub http_port: u16,

    /// Managed policies on the instance role
    pub managed_policies: Vec<String>,
}

impl Default for WebServerSection {
    fn default() -> Self {
        let defaults = WebServerConfig::default();
        Self {
            stack_name: "CdkLabWebServerStack".to_string(),
            instance_type: defaults.instance_type,
            http_port: defaults.http_port,
            managed_policies: vec![SSM_MANAGED_INSTANCE_CORE.to_string()],
        }
    }
}

/// Database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// MySQL engine version
    pub engine_version: String,

    /// Instance type, without the `db.` prefix
    pub instance_type: InstanceType,

    /// Initial storage (GiB)
    pub allocated_storage_gb: u32,

    /// Storage autoscaling ceiling (GiB)
    pub max_allocated_storage_gb: u32,

    /// Standby in a second AZ
    pub multi_az: bool,

    /// Reachable from the internet
    pub publicly_accessible: bool,

    /// Initial database name
    pub database_name: String,

    /// Master user name
    pub master_username: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let spec = DatabaseSpec::default();
        Self {
            engine_version: spec.engine_version,
            instance_type: spec.instance_type,
            allocated_storage_gb: spec.allocated_storage_gb,
            max_allocated_storage_gb: spec.max_allocated_storage_gb,
            multi_az: spec.multi_az,
            publicly_accessible: spec.publicly_accessible,
            database_name: spec.database_name,
            master_username: spec.master_username,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(Error::FileNotFound(path.clone()));
            }
        }

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                debug!(path = %path.display(), "loading configuration");
                config = config.merge_from_file(&path)?;
            }
        }

        // Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("cloudlab").join(CONFIG_FILE_NAME));
        }

        // Project config (current directory)
        paths.push(PathBuf::from(CONFIG_FILE_NAME));

        // Environment variable
        if let Ok(env_config) = std::env::var("CLOUDLAB_CONFIG") {
            paths.insert(0, PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        // Determine format based on extension
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let overlay = parse_document(extension, &content).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        self.merge(overlay)
    }

    /// Merge a partial configuration document into this one. Keys present
    /// in `overlay` win; tables merge recursively, everything else replaces.
    fn merge(&self, overlay: Value) -> Result<Config> {
        let mut base = serde_json::to_value(self)?;
        merge_values(&mut base, overlay);
        serde_json::from_value(base).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // CLOUDLAB_REGION
        if let Ok(region) = std::env::var("CLOUDLAB_REGION") {
            self.environment.region = Some(region);
        }

        // CLOUDLAB_ACCOUNT
        if let Ok(account) = std::env::var("CLOUDLAB_ACCOUNT") {
            self.environment.account = Some(account);
        }

        // CLOUDLAB_OUTPUT_DIR
        if let Ok(dir) = std::env::var("CLOUDLAB_OUTPUT_DIR") {
            self.app.output_dir = PathBuf::from(dir);
        }

        // CLOUDLAB_LOG_LEVEL
        if let Ok(level) = std::env::var("CLOUDLAB_LOG_LEVEL") {
            self.logging.level = level;
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("CLOUDLAB_NO_COLOR").is_ok() {
            self.app.color = false;
        }
    }

    /// Network stack settings
    pub fn network_spec(&self) -> NetworkSpec {
        NetworkSpec {
            construct_id: self.network.vpc_id.clone(),
            address_block: self.network.cidr,
            subnet_plan: self.network.subnets.clone(),
            availability_zone_count: self.network.max_azs,
            nat_gateways: self.network.nat_gateways,
        }
    }

    /// Web-server stack settings
    pub fn web_server_config(&self) -> WebServerConfig {
        let db = &self.database;
        WebServerConfig {
            instance_type: self.web_server.instance_type.clone(),
            http_port: self.web_server.http_port,
            managed_policies: self.web_server.managed_policies.clone(),
            database: DatabaseSpec {
                engine_version: db.engine_version.clone(),
                instance_type: db.instance_type.clone(),
                allocated_storage_gb: db.allocated_storage_gb,
                max_allocated_storage_gb: db.max_allocated_storage_gb,
                multi_az: db.multi_az,
                publicly_accessible: db.publicly_accessible,
                database_name: db.database_name.clone(),
                master_username: db.master_username.clone(),
                ..DatabaseSpec::default()
            },
            ..WebServerConfig::default()
        }
    }

    /// Render as a TOML document, used by `init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a specific file only, ignoring the search path and
    /// environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Config::default().merge_from_file(path)
    }
}

/// Parse a configuration document, picking the format by extension.
/// Unknown extensions try TOML, then YAML.
fn parse_document(extension: &str, content: &str) -> Result<Value> {
    Ok(match extension {
        "yml" | "yaml" => serde_yaml::from_str(content)?,
        "json" => serde_json::from_str(content)?,
        "toml" => toml::from_str(content)?,
        _ => match toml::from_str(content) {
            Ok(value) => value,
            Err(_) => serde_yaml::from_str(content)?,
        },
    })
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
