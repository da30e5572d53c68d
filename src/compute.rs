//! EC2 instances: instance types, machine images, and one instance per
//! public subnet.

use crate::error::{Error, Result};
use crate::iam::add_instance_profile;
use crate::network::AvailabilityZone;
use crate::template::intrinsic::{base64, get_att, get_azs, reference, select};
use crate::template::{make_unique_id, Parameter, Resource, StackBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

static INSTANCE_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*\.[a-z0-9]+$").expect("Invalid instance type regex"));

/// Default user data for Linux instances.
pub const LINUX_USER_DATA: &str = "#!/bin/bash";

/// An EC2 instance type such as `t2.micro`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceType(String);

impl InstanceType {
    /// Validate and wrap an instance type name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !INSTANCE_TYPE_RE.is_match(&name) {
            return Err(Error::InvalidInstanceType(name));
        }
        Ok(Self(name))
    }

    /// Wrap a built-in default without validation.
    pub(crate) fn known(name: &'static str) -> Self {
        Self(name.to_string())
    }

    /// The type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// RDS instance class for the same hardware, e.g. `db.t3.micro`.
    pub fn db_instance_class(&self) -> String {
        format!("db.{}", self.0)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InstanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for InstanceType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<InstanceType> for String {
    fn from(value: InstanceType) -> Self {
        value.0
    }
}

/// Machine image selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineImage {
    /// Latest Amazon Linux, resolved at deploy time through SSM
    #[default]
    LatestAmazonLinux,
}

impl MachineImage {
    /// SSM parameter holding the image id.
    pub fn ssm_parameter(&self) -> &'static str {
        match self {
            MachineImage::LatestAmazonLinux => {
                "/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2"
            }
        }
    }

    /// Declare the image parameter on `stack` and return a `Ref` to it.
    pub fn synthesize(&self, stack: &mut StackBuilder) -> Value {
        let id = make_unique_id(&[format!(
            "SsmParameterValue:{}:C96584B6-F00A-464E-AD19-53AFF4B05118.Parameter",
            self.ssm_parameter()
        )]);
        let id = stack.add_parameter(
            id,
            Parameter {
                parameter_type: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".to_string(),
                default: Some(self.ssm_parameter().to_string()),
            },
        );
        reference(&id)
    }
}

/// Template value of an availability zone.
pub fn availability_zone_value(zone: &AvailabilityZone) -> Value {
    match zone {
        AvailabilityZone::Named(name) => json!(name),
        AvailabilityZone::Indexed(i) => select(usize::from(*i), get_azs()),
    }
}

/// One web-server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInstance {
    /// Construct id, `WebServerInstance<n>`
    pub construct_id: String,
    /// Construct id of the subnet it is placed in
    pub subnet: String,
    /// Zone of that subnet
    pub availability_zone: AvailabilityZone,
    /// Instance size
    pub instance_type: InstanceType,
    /// Image
    pub image: MachineImage,
    /// Construct id of the instance role
    pub role: String,
    /// Construct id of the security group
    pub security_group: String,
}

/// Template handles an instance needs from the rest of the stack.
#[derive(Debug, Clone)]
pub struct InstanceBindings<'a> {
    /// Subnet id value (usually an import)
    pub subnet_id: Value,
    /// Image id value
    pub image_id: &'a Value,
    /// Logical ID of the role
    pub role: &'a str,
    /// Logical ID of the security group
    pub security_group: &'a str,
}

impl ComputeInstance {
    /// Add the instance and its instance profile to `stack`.
    pub fn synthesize(
        &self,
        stack: &mut StackBuilder,
        bindings: InstanceBindings<'_>,
    ) -> Result<String> {
        let owner = stack.root().child(&self.construct_id);
        let profile = add_instance_profile(stack, &owner, bindings.role)?;

        let properties = json!({
            "AvailabilityZone": availability_zone_value(&self.availability_zone),
            "IamInstanceProfile": reference(&profile),
            "ImageId": bindings.image_id,
            "InstanceType": self.instance_type.as_str(),
            "SecurityGroupIds": [get_att(bindings.security_group, "GroupId")],
            "SubnetId": bindings.subnet_id,
            "Tags": [{ "Key": "Name", "Value": owner.to_string() }],
            "UserData": base64(json!(LINUX_USER_DATA))
        });

        stack.add_resource(
            &owner.child("Resource"),
            Resource::new("AWS::EC2::Instance", properties).depends_on(bindings.role),
        )
    }
}
