//! Managed relational database: engine, storage bounds, placement, and the
//! generated master credentials.

use crate::compute::InstanceType;
use crate::error::{Error, Result};
use crate::network::{NetworkTopology, SubnetKind};
use crate::template::intrinsic::{get_att, join, reference};
use crate::template::{DeletionPolicy, Resource, StackBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

static ENGINE_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").expect("Invalid engine version regex"));

static DATABASE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{0,63}$").expect("Invalid database name regex"));

/// Smallest allocated storage the engine accepts, in GiB.
pub const MIN_ALLOCATED_STORAGE_GB: u32 = 20;

/// Characters the generated password must not contain.
const EXCLUDED_PASSWORD_CHARS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

/// Database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    /// MySQL
    #[default]
    Mysql,
}

impl DatabaseEngine {
    /// CloudFormation `Engine` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::Mysql => "mysql",
        }
    }

    /// Port the engine listens on.
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseEngine::Mysql => 3306,
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A managed database instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Construct id
    pub construct_id: String,
    /// Engine
    pub engine: DatabaseEngine,
    /// Engine version, e.g. `8.0.28`
    pub engine_version: String,
    /// Hardware, rendered with a `db.` prefix
    pub instance_type: InstanceType,
    /// Subnet kind to place the database in
    pub placement: SubnetKind,
    /// Initial storage in GiB
    pub allocated_storage_gb: u32,
    /// Autoscaling ceiling in GiB
    pub max_allocated_storage_gb: u32,
    /// Standby in a second zone
    pub multi_az: bool,
    /// Reachable from the internet
    pub publicly_accessible: bool,
    /// Initial database name
    pub database_name: String,
    /// Master user name; the password is generated
    pub master_username: String,
    /// What happens to the data when the resource goes away
    pub removal_policy: DeletionPolicy,
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            construct_id: "MySQLInstance".to_string(),
            engine: DatabaseEngine::Mysql,
            engine_version: "8.0.28".to_string(),
            instance_type: InstanceType::known("t3.micro"),
            placement: SubnetKind::PrivateWithNat,
            allocated_storage_gb: MIN_ALLOCATED_STORAGE_GB,
            max_allocated_storage_gb: 100,
            multi_az: false,
            publicly_accessible: false,
            database_name: "MyAppDB".to_string(),
            master_username: "admin".to_string(),
            removal_policy: DeletionPolicy::Snapshot,
        }
    }
}

/// Logical IDs of the resources a database synthesizes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedDatabase {
    /// `AWS::RDS::DBInstance`
    pub instance: String,
    /// `AWS::RDS::DBSubnetGroup`
    pub subnet_group: String,
    /// `AWS::SecretsManager::Secret` holding the master credentials
    pub secret: String,
}

impl DatabaseSpec {
    /// Check storage bounds, engine version and names.
    pub fn validate(&self) -> Result<()> {
        if self.allocated_storage_gb < MIN_ALLOCATED_STORAGE_GB {
            return Err(Error::invalid_storage(
                &self.construct_id,
                format!(
                    "allocated storage {} GiB is below the minimum of {} GiB",
                    self.allocated_storage_gb, MIN_ALLOCATED_STORAGE_GB
                ),
            ));
        }
        if self.max_allocated_storage_gb <= self.allocated_storage_gb {
            return Err(Error::invalid_storage(
                &self.construct_id,
                format!(
                    "max allocated storage {} GiB must exceed allocated storage {} GiB",
                    self.max_allocated_storage_gb, self.allocated_storage_gb
                ),
            ));
        }
        if !ENGINE_VERSION_RE.is_match(&self.engine_version) {
            return Err(Error::InvalidEngineVersion {
                engine: self.engine.to_string(),
                version: self.engine_version.clone(),
            });
        }
        if !DATABASE_NAME_RE.is_match(&self.database_name) {
            return Err(Error::InvalidDatabaseName(self.database_name.clone()));
        }
        if self.master_username.is_empty() {
            return Err(Error::invalid_config(
                "database.master_username",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Port clients connect on.
    pub fn port(&self) -> u16 {
        self.engine.default_port()
    }

    /// Add the database and its supporting resources to `stack`.
    ///
    /// `subnet_ids` are the ids of the subnets in [`DatabaseSpec::placement`],
    /// usually imports from the network stack.
    pub fn synthesize(
        &self,
        stack: &mut StackBuilder,
        subnet_ids: Vec<Value>,
        security_group: &str,
    ) -> Result<SynthesizedDatabase> {
        self.validate()?;
        let owner = stack.root().child(&self.construct_id);

        let subnet_group = stack.add_resource(
            &owner.child("SubnetGroup").child("Default"),
            Resource::new(
                "AWS::RDS::DBSubnetGroup",
                json!({
                    "DBSubnetGroupDescription": format!("Subnet group for {} database", self.construct_id),
                    "SubnetIds": subnet_ids
                }),
            ),
        )?;

        let secret = stack.add_resource(
            &owner.child("Secret").child("Resource"),
            Resource::new(
                "AWS::SecretsManager::Secret",
                json!({
                    "Description": join("", vec![
                        json!("Generated by the CDK for stack: "),
                        reference("AWS::StackName"),
                    ]),
                    "GenerateSecretString": {
                        "ExcludeCharacters": EXCLUDED_PASSWORD_CHARS,
                        "GenerateStringKey": "password",
                        "PasswordLength": 30,
                        "SecretStringTemplate": json!({ "username": self.master_username }).to_string()
                    }
                }),
            )
            .with_removal_policy(DeletionPolicy::Delete),
        )?;

        let properties = json!({
            "AllocatedStorage": self.allocated_storage_gb.to_string(),
            "CopyTagsToSnapshot": true,
            "DBInstanceClass": self.instance_type.db_instance_class(),
            "DBName": self.database_name,
            "DBSubnetGroupName": reference(&subnet_group),
            "Engine": self.engine.as_str(),
            "EngineVersion": self.engine_version,
            "MasterUserPassword": secret_field(&secret, "password"),
            "MasterUsername": secret_field(&secret, "username"),
            "MaxAllocatedStorage": self.max_allocated_storage_gb,
            "MultiAZ": self.multi_az,
            "PubliclyAccessible": self.publicly_accessible,
            "StorageType": "gp2",
            "VPCSecurityGroups": [get_att(security_group, "GroupId")]
        });

        let instance = stack.add_resource(
            &owner.child("Resource"),
            Resource::new("AWS::RDS::DBInstance", properties)
                .with_removal_policy(self.removal_policy),
        )?;

        stack.add_resource(
            &owner.child("Secret").child("Attachment").child("Resource"),
            Resource::new(
                "AWS::SecretsManager::SecretTargetAttachment",
                json!({
                    "SecretId": reference(&secret),
                    "TargetId": reference(&instance),
                    "TargetType": "AWS::RDS::DBInstance"
                }),
            ),
        )?;

        debug!(database = %self.construct_id, %instance, "database synthesized");
        Ok(SynthesizedDatabase {
            instance,
            subnet_group,
            secret,
        })
    }

    /// Subnets of `network` the database is placed in.
    pub fn placement_subnets<'a>(
        &self,
        network: &'a NetworkTopology,
    ) -> Result<Vec<&'a crate::network::Subnet>> {
        let subnets: Vec<_> = network.subnets_of(self.placement).collect();
        if subnets.is_empty() {
            return Err(Error::NoSubnetsOfKind {
                network: network.construct_id.clone(),
                kind: self.placement.to_string(),
            });
        }
        Ok(subnets)
    }
}

/// Dynamic reference to one field of a Secrets Manager secret.
fn secret_field(secret: &str, field: &str) -> Value {
    join(
        "",
        vec![
            json!("{{resolve:secretsmanager:"),
            reference(secret),
            json!(format!(":SecretString:{}::}}}}", field)),
        ],
    )
}
