//! IAM role for the web-server instances and the instance profiles that
//! attach it.

use crate::error::Result;
use crate::template::intrinsic::{join, partition, reference};
use crate::template::{ConstructPath, Resource, StackBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Service principal of EC2.
pub const EC2_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Managed policy granting Systems Manager access to an instance.
pub const SSM_MANAGED_INSTANCE_CORE: &str = "AmazonSSMManagedInstanceCore";

/// A role assumed by a service, carrying AWS managed policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRole {
    /// Construct id
    pub construct_id: String,
    /// Service principal allowed to assume the role
    pub assumed_by: String,
    /// AWS managed policy names
    pub managed_policies: Vec<String>,
}

impl InstanceRole {
    /// A role EC2 can assume, scoped to instance management through SSM.
    pub fn ssm_managed(construct_id: impl Into<String>) -> Self {
        Self {
            construct_id: construct_id.into(),
            assumed_by: EC2_SERVICE_PRINCIPAL.to_string(),
            managed_policies: vec![SSM_MANAGED_INSTANCE_CORE.to_string()],
        }
    }

    /// Add the role to `stack`, returning its logical ID.
    pub fn synthesize(&self, stack: &mut StackBuilder) -> Result<String> {
        let path = stack.root().child(&self.construct_id).child("Resource");
        let properties = json!({
            "AssumeRolePolicyDocument": {
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": self.assumed_by }
                }],
                "Version": "2012-10-17"
            },
            "ManagedPolicyArns": self
                .managed_policies
                .iter()
                .map(|name| managed_policy_arn(name))
                .collect::<Vec<_>>()
        });
        stack.add_resource(&path, Resource::new("AWS::IAM::Role", properties))
    }
}

/// Partition-aware ARN of an AWS managed policy.
pub fn managed_policy_arn(name: &str) -> Value {
    join(
        "",
        vec![
            json!("arn:"),
            partition(),
            json!(format!(":iam::aws:policy/{}", name)),
        ],
    )
}

/// Add an instance profile for `role_logical_id` under `owner`.
pub fn add_instance_profile(
    stack: &mut StackBuilder,
    owner: &ConstructPath,
    role_logical_id: &str,
) -> Result<String> {
    let path = owner.child("InstanceProfile");
    stack.add_resource(
        &path,
        Resource::new(
            "AWS::IAM::InstanceProfile",
            json!({ "Roles": [reference(role_logical_id)] }),
        ),
    )
}
