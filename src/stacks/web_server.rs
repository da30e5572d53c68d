//! The web-server stack: instance role, security groups, one instance per
//! public subnet, and the MySQL database in the private subnets.

use super::network::NetworkExports;
use crate::compute::{ComputeInstance, InstanceBindings, InstanceType, MachineImage};
use crate::database::DatabaseSpec;
use crate::error::Result;
use crate::iam::{InstanceRole, SSM_MANAGED_INSTANCE_CORE};
use crate::network::{NetworkTopology, SubnetKind};
use crate::security::{Peer, SecurityGroup};
use crate::template::{StackBuilder, Template};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Everything the web-server stack can be tuned by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServerConfig {
    /// Construct id of the instance role
    pub role_id: String,
    /// AWS managed policies attached to the role
    pub managed_policies: Vec<String>,
    /// Construct id of the web security group
    pub web_security_group_id: String,
    /// Description of the web security group
    pub web_security_group_description: String,
    /// Construct id of the database security group
    pub database_security_group_id: String,
    /// Description of the database security group
    pub database_security_group_description: String,
    /// Port opened to the internet on the web servers
    pub http_port: u16,
    /// Web-server instance size
    pub instance_type: InstanceType,
    /// Web-server image
    pub image: MachineImage,
    /// The database
    pub database: DatabaseSpec,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            role_id: "InstanceSSMRole".to_string(),
            managed_policies: vec![SSM_MANAGED_INSTANCE_CORE.to_string()],
            web_security_group_id: "WebServerSG".to_string(),
            web_security_group_description: "Allow HTTP traffic".to_string(),
            database_security_group_id: "RDSSG".to_string(),
            database_security_group_description: "Allow MySQL traffic from web servers"
                .to_string(),
            http_port: 80,
            instance_type: InstanceType::known("t2.micro"),
            image: MachineImage::LatestAmazonLinux,
            database: DatabaseSpec::default(),
        }
    }
}

/// The web-server stack laid out against a concrete network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebServerPlan {
    /// Instance role
    pub role: InstanceRole,
    /// Group on the web servers
    pub web_security_group: SecurityGroup,
    /// Group on the database
    pub database_security_group: SecurityGroup,
    /// One instance per public subnet
    pub instances: Vec<ComputeInstance>,
    /// The database
    pub database: DatabaseSpec,
    /// Construct ids of the subnets the database is placed in
    pub database_subnets: Vec<String>,
}

impl WebServerPlan {
    /// Lay out `config` on `network`.
    #[instrument(skip_all, fields(network = %network.construct_id))]
    pub fn resolve(config: &WebServerConfig, network: &NetworkTopology) -> Result<Self> {
        config.database.validate()?;

        let role = InstanceRole {
            managed_policies: config.managed_policies.clone(),
            ..InstanceRole::ssm_managed(&config.role_id)
        };

        let mut web_security_group = SecurityGroup::new(
            &config.web_security_group_id,
            &config.web_security_group_description,
        );
        web_security_group.add_ingress_rule(Peer::AnyIpv4, config.http_port);

        let mut database_security_group = SecurityGroup::new(
            &config.database_security_group_id,
            &config.database_security_group_description,
        );
        database_security_group.add_ingress_rule(
            Peer::SecurityGroup(config.web_security_group_id.clone()),
            config.database.port(),
        );

        let instances: Vec<ComputeInstance> = network
            .subnets_of(SubnetKind::Public)
            .enumerate()
            .map(|(i, subnet)| ComputeInstance {
                construct_id: format!("WebServerInstance{}", i + 1),
                subnet: subnet.construct_id.clone(),
                availability_zone: subnet.availability_zone.clone(),
                instance_type: config.instance_type.clone(),
                image: config.image,
                role: role.construct_id.clone(),
                security_group: web_security_group.construct_id.clone(),
            })
            .collect();

        let database_subnets = config
            .database
            .placement_subnets(network)?
            .into_iter()
            .map(|s| s.construct_id.clone())
            .collect();

        debug!(instances = instances.len(), "web server plan resolved");
        Ok(Self {
            role,
            web_security_group,
            database_security_group,
            instances,
            database: config.database.clone(),
            database_subnets,
        })
    }
}

/// A resolved web-server stack.
#[derive(Debug, Clone)]
pub struct WebServerStack {
    name: String,
    plan: WebServerPlan,
}

impl WebServerStack {
    /// Resolve `config` against the network it will be deployed into.
    pub fn new(
        name: impl Into<String>,
        config: &WebServerConfig,
        network: &NetworkTopology,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            plan: WebServerPlan::resolve(config, network)?,
        })
    }

    /// Stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved plan.
    pub fn plan(&self) -> &WebServerPlan {
        &self.plan
    }

    /// Render the template, importing network ids through `exports`.
    #[instrument(skip_all, fields(stack = %self.name))]
    pub fn synthesize(&self, exports: &NetworkExports) -> Result<Template> {
        let plan = &self.plan;
        let mut stack = StackBuilder::new(&self.name);
        let vpc_id = exports.vpc_id_value();

        let role = plan.role.synthesize(&mut stack)?;

        let mut groups = HashMap::new();
        let web_sg = plan
            .web_security_group
            .synthesize(&mut stack, &vpc_id, &mut groups)?;
        let database_sg = plan
            .database_security_group
            .synthesize(&mut stack, &vpc_id, &mut groups)?;

        if let Some(first) = plan.instances.first() {
            let image_id = first.image.synthesize(&mut stack);
            for instance in &plan.instances {
                instance.synthesize(
                    &mut stack,
                    InstanceBindings {
                        subnet_id: exports.subnet_id_value(&instance.subnet)?,
                        image_id: &image_id,
                        role: &role,
                        security_group: &web_sg.logical_id,
                    },
                )?;
            }
        }

        let subnet_ids = plan
            .database_subnets
            .iter()
            .map(|s| exports.subnet_id_value(s))
            .collect::<Result<Vec<_>>>()?;
        plan.database
            .synthesize(&mut stack, subnet_ids, &database_sg.logical_id)?;

        let template = stack.build()?;
        info!(
            resources = template.resources.len(),
            instances = plan.instances.len(),
            "web server stack synthesized"
        );
        Ok(template)
    }
}
