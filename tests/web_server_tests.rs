//! Integration tests for the web-server stack
//!
//! These tests cover:
//! - One instance per public subnet of the supplied network
//! - Security group posture (web open on HTTP, database only from web)
//! - Database placement and settings
//! - Invariant checks on tampered plans

use cloudlab::config::Config;
use cloudlab::invariants::{self, Rule};
use cloudlab::network::{AvailabilityZone, NetworkSpec, SubnetGroup};
use cloudlab::security::Peer;
use cloudlab::stacks::{App, Environment, WebServerConfig};
use cloudlab::template::Template;
use cloudlab::Error;
use pretty_assertions::assert_eq;
use serde_json::json;

fn app_with_azs(azs: u8) -> App {
    let spec = NetworkSpec {
        availability_zone_count: azs,
        ..NetworkSpec::default()
    };
    App::new(
        Environment::default(),
        ("Net", spec),
        ("Web", &WebServerConfig::default()),
    )
    .unwrap()
}

fn web_template(app: &App) -> Template {
    let assembly = app.synthesize().unwrap();
    assembly.stack(app.web_server().name()).unwrap().template.clone()
}

// ============================================================================
// Default Scenario
// ============================================================================

#[test]
fn test_default_scenario() {
    let app = App::from_config(&Config::default()).unwrap();
    let assembly = app.synthesize().unwrap();

    let network = &assembly.stack("CdkLabNetworkStack").unwrap().template;
    assert_eq!(network.count_of_type("AWS::EC2::Subnet"), 4);

    let web = &assembly.stack("CdkLabWebServerStack").unwrap().template;
    assert_eq!(web.count_of_type("AWS::EC2::Instance"), 2);
    assert_eq!(web.count_of_type("AWS::RDS::DBInstance"), 1);

    let (_, db) = web.resources_of_type("AWS::RDS::DBInstance").next().unwrap();
    assert_eq!(db.properties["Engine"], "mysql");
    assert_eq!(db.properties["EngineVersion"], "8.0.28");
    assert_eq!(db.properties["DBInstanceClass"], "db.t3.micro");
    assert_eq!(db.properties["AllocatedStorage"], "20");
    assert_eq!(db.properties["MaxAllocatedStorage"], 100);
    assert_eq!(db.properties["MultiAZ"], false);
    assert_eq!(db.properties["PubliclyAccessible"], false);
    assert_eq!(db.properties["DBName"], "MyAppDB");

    for (_, instance) in web.resources_of_type("AWS::EC2::Instance") {
        assert_eq!(instance.properties["InstanceType"], "t2.micro");
    }
}

#[test]
fn test_web_stack_depends_on_network() {
    let app = App::from_config(&Config::default()).unwrap();
    assert_eq!(
        app.dependencies_of("CdkLabWebServerStack").unwrap(),
        vec!["CdkLabNetworkStack"]
    );
    assert!(matches!(
        app.dependencies_of("Other"),
        Err(Error::StackNotFound(_))
    ));
}

// ============================================================================
// Instances
// ============================================================================

#[test]
fn test_instances_follow_public_subnets() {
    for azs in 1..=4 {
        let app = app_with_azs(azs);
        let template = web_template(&app);
        assert_eq!(
            template.count_of_type("AWS::EC2::Instance"),
            usize::from(azs),
            "azs = {}",
            azs
        );
        assert_eq!(
            app.web_server().plan().instances.len(),
            app.network().topology().public_subnets().len()
        );
    }
}

#[test]
fn test_extra_public_group_gets_instances_too() {
    let spec = NetworkSpec {
        subnet_plan: vec![
            SubnetGroup::public("Edge"),
            SubnetGroup::public("Ingress"),
            SubnetGroup::private_with_nat("App"),
        ],
        ..NetworkSpec::default()
    };
    let app = App::new(
        Environment::default(),
        ("Net", spec),
        ("Web", &WebServerConfig::default()),
    )
    .unwrap();
    let subnets: Vec<&str> = app
        .web_server()
        .plan()
        .instances
        .iter()
        .map(|i| i.subnet.as_str())
        .collect();
    assert_eq!(
        subnets,
        vec![
            "EdgeSubnet1",
            "EdgeSubnet2",
            "IngressSubnet1",
            "IngressSubnet2"
        ]
    );
}

#[test]
fn test_first_instance_follows_plan_order() {
    let spec = NetworkSpec {
        subnet_plan: vec![
            SubnetGroup::public("Ingress"),
            SubnetGroup::public("Mgmt").with_cidr_mask(24),
            SubnetGroup::private_with_nat("App"),
        ],
        ..NetworkSpec::default()
    };
    let app = App::new(
        Environment::default(),
        ("Net", spec),
        ("Web", &WebServerConfig::default()),
    )
    .unwrap();
    let plan = app.web_server().plan();
    assert_eq!(plan.instances[0].subnet, "IngressSubnet1");
    assert_eq!(plan.instances[2].subnet, "MgmtSubnet1");
}

#[test]
fn test_instances_use_role_and_image_parameter() {
    let template = web_template(&app_with_azs(2));
    let (role_id, _) = template.resources_of_type("AWS::IAM::Role").next().unwrap();
    let (parameter_id, parameter) = template.parameters.first().unwrap();
    assert_eq!(
        parameter.default.as_deref(),
        Some("/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2")
    );

    for (_, instance) in template.resources_of_type("AWS::EC2::Instance") {
        assert_eq!(instance.properties["ImageId"], json!({ "Ref": parameter_id }));
        assert_eq!(instance.depends_on, vec![role_id.clone()]);
    }
}

// ============================================================================
// Security Groups
// ============================================================================

#[test]
fn test_web_group_open_on_http_only() {
    let template = web_template(&app_with_azs(2));
    let web = template
        .resources_of_type("AWS::EC2::SecurityGroup")
        .find(|(_, r)| r.properties["GroupDescription"] == "Allow HTTP traffic")
        .map(|(_, r)| r)
        .unwrap();
    assert_eq!(
        web.properties["SecurityGroupIngress"],
        json!([{
            "CidrIp": "0.0.0.0/0",
            "Description": "from 0.0.0.0/0:80",
            "FromPort": 80,
            "IpProtocol": "tcp",
            "ToPort": 80
        }])
    );
}

#[test]
fn test_database_group_admits_only_web_on_mysql_port() {
    let template = web_template(&app_with_azs(2));
    let group_id = |description: &str| {
        template
            .resources_of_type("AWS::EC2::SecurityGroup")
            .find(|(_, r)| r.properties["GroupDescription"] == description)
            .map(|(id, _)| id.clone())
            .unwrap()
    };
    let web = group_id("Allow HTTP traffic");
    let rds = group_id("Allow MySQL traffic from web servers");

    let rules: Vec<_> = template
        .resources_of_type("AWS::EC2::SecurityGroupIngress")
        .map(|(_, r)| r)
        .collect();
    assert_eq!(rules.len(), 1);
    let rule = rules[0];
    assert_eq!(rule.properties["GroupId"], json!({ "Fn::GetAtt": [rds, "GroupId"] }));
    assert_eq!(
        rule.properties["SourceSecurityGroupId"],
        json!({ "Fn::GetAtt": [web, "GroupId"] })
    );
    assert_eq!(rule.properties["FromPort"], 3306);
    assert_eq!(rule.properties["ToPort"], 3306);

    let (_, rds_group) = template
        .resources_of_type("AWS::EC2::SecurityGroup")
        .find(|(id, _)| **id == rds)
        .unwrap();
    assert!(rds_group.properties.get("SecurityGroupIngress").is_none());
}

#[test]
fn test_web_group_never_admits_database_group() {
    let app = app_with_azs(3);
    let plan = app.web_server().plan();
    assert!(!plan.web_security_group.admits_group("RDSSG"));
    assert_eq!(
        plan.database_security_group
            .ports_from(&Peer::SecurityGroup("WebServerSG".into())),
        vec![3306]
    );
    assert!(plan
        .database_security_group
        .ports_from(&Peer::AnyIpv4)
        .is_empty());
}

// ============================================================================
// Database
// ============================================================================

#[test]
fn test_database_uses_private_subnets() {
    let app = app_with_azs(2);
    assert_eq!(
        app.web_server().plan().database_subnets,
        vec!["PrivateSubnetSubnet1", "PrivateSubnetSubnet2"]
    );
}

#[test]
fn test_database_needs_private_subnets() {
    let spec = NetworkSpec {
        subnet_plan: vec![SubnetGroup::public("Public")],
        ..NetworkSpec::default()
    };
    let err = App::new(
        Environment::default(),
        ("Net", spec),
        ("Web", &WebServerConfig::default()),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NoSubnetsOfKind { .. }));
}

#[test]
fn test_database_storage_bounds_rejected() {
    let mut config = WebServerConfig::default();
    config.database.allocated_storage_gb = 200;
    let err = App::new(
        Environment::default(),
        ("Net", NetworkSpec::default()),
        ("Web", &config),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidStorage { .. }));
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_default_app_has_no_violations() {
    let app = App::from_config(&Config::default()).unwrap();
    assert!(invariants::check(&app).is_empty());
}

#[test]
fn test_tampered_plan_reports_every_violation() {
    let app = app_with_azs(2);
    let topology = app.network().topology();
    let mut plan = app.web_server().plan().clone();

    plan.instances.pop();
    plan.web_security_group
        .add_ingress_rule(Peer::SecurityGroup("RDSSG".into()), 22);
    plan.database_security_group
        .add_ingress_rule(Peer::AnyIpv4, 3306);
    plan.database_subnets = vec!["PublicSubnetSubnet1".into()];

    let rules: Vec<Rule> = invariants::check_web_server(&plan, topology)
        .into_iter()
        .map(|v| v.rule)
        .collect();
    assert_eq!(
        rules,
        vec![
            Rule::InstancePerPublicSubnet,
            Rule::SecurityGroupAsymmetry,
            Rule::DatabaseIngress,
            Rule::DatabasePlacement
        ]
    );
}

#[test]
fn test_zone_names_follow_region() {
    let config = Config {
        environment: Environment {
            account: None,
            region: Some("eu-west-1".into()),
        },
        ..Config::default()
    };
    let app = App::from_config(&config).unwrap();
    let zones = &app.network().topology().availability_zones;
    assert_eq!(
        zones,
        &vec![
            AvailabilityZone::Named("eu-west-1a".into()),
            AvailabilityZone::Named("eu-west-1b".into())
        ]
    );
}
