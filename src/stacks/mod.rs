//! The two stacks and the app that ties them together.
//!
//! The network stack is a leaf; the web-server stack is resolved against the
//! network's topology and imports its ids at deploy time. [`App`] keeps them
//! in dependency order and synthesizes both into a [`CloudAssembly`].

mod network;
mod web_server;

pub use network::{NetworkExports, NetworkStack};
pub use web_server::{WebServerConfig, WebServerPlan, WebServerStack};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::invariants;
use crate::network::{AvailabilityZone, NetworkSpec};
use crate::synth::{CloudAssembly, StackArtifact};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument};

/// Account and region a stack is deployed to. Either may be left for the
/// deployment engine to decide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// AWS account id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// AWS region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Environment {
    /// An environment pinned to both account and region.
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

/// Both stacks, resolved.
#[derive(Debug, Clone)]
pub struct App {
    environment: Environment,
    network: NetworkStack,
    web_server: WebServerStack,
}

impl App {
    /// Resolve both stacks.
    pub fn new(
        environment: Environment,
        network: (&str, NetworkSpec),
        web_server: (&str, &WebServerConfig),
    ) -> Result<Self> {
        let (network_name, network_spec) = network;
        let zones = AvailabilityZone::for_region(
            environment.region.as_deref(),
            network_spec.availability_zone_count,
        )?;
        let network = NetworkStack::new(network_name, network_spec, zones)?;

        let (web_name, web_config) = web_server;
        let web_server = WebServerStack::new(web_name, web_config, network.topology())?;

        Ok(Self {
            environment,
            network,
            web_server,
        })
    }

    /// Resolve both stacks from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.environment.clone(),
            (&config.network.stack_name, config.network_spec()),
            (&config.web_server.stack_name, &config.web_server_config()),
        )
    }

    /// Deployment environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The network stack.
    pub fn network(&self) -> &NetworkStack {
        &self.network
    }

    /// The web-server stack.
    pub fn web_server(&self) -> &WebServerStack {
        &self.web_server
    }

    /// Stack names, dependencies first.
    pub fn stack_names(&self) -> Vec<&str> {
        vec![self.network.name(), self.web_server.name()]
    }

    /// Stacks `stack` depends on.
    pub fn dependencies_of(&self, stack: &str) -> Result<Vec<&str>> {
        if stack == self.network.name() {
            Ok(Vec::new())
        } else if stack == self.web_server.name() {
            Ok(vec![self.network.name()])
        } else {
            Err(Error::StackNotFound(stack.to_string()))
        }
    }

    /// Check the invariants, then synthesize both stacks in dependency order.
    #[instrument(skip(self), fields(env = %self.environment))]
    pub fn synthesize(&self) -> Result<CloudAssembly> {
        let violations = invariants::check(self);
        if !violations.is_empty() {
            return Err(invariants::into_error(&violations));
        }

        let environment = self.environment.to_string();
        let (network_template, exports) = self.network.synthesize()?;
        let web_template = self.web_server.synthesize(&exports)?;

        let mut assembly = CloudAssembly::new();
        assembly.add(StackArtifact {
            name: self.network.name().to_string(),
            environment: environment.clone(),
            dependencies: Vec::new(),
            template: network_template,
        });
        assembly.add(StackArtifact {
            name: self.web_server.name().to_string(),
            environment,
            dependencies: vec![self.network.name().to_string()],
            template: web_template,
        });

        info!(stacks = assembly.artifacts().len(), "app synthesized");
        Ok(assembly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_display() {
        assert_eq!(
            Environment::default().to_string(),
            "aws://unknown-account/unknown-region"
        );
        assert_eq!(
            Environment::new("123456789012", "us-east-1").to_string(),
            "aws://123456789012/us-east-1"
        );
    }

    #[test]
    fn test_app_from_default_config() {
        let app = App::from_config(&Config::default()).unwrap();
        assert_eq!(
            app.stack_names(),
            vec!["CdkLabNetworkStack", "CdkLabWebServerStack"]
        );
        assert_eq!(
            app.dependencies_of("CdkLabWebServerStack").unwrap(),
            vec!["CdkLabNetworkStack"]
        );
        assert!(app.dependencies_of("Missing").is_err());
    }

    #[test]
    fn test_synthesize_orders_stacks() {
        let app = App::from_config(&Config::default()).unwrap();
        let assembly = app.synthesize().unwrap();
        let names: Vec<&str> = assembly.artifacts().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["CdkLabNetworkStack", "CdkLabWebServerStack"]);
        assert_eq!(
            assembly.artifacts()[1].dependencies,
            vec!["CdkLabNetworkStack".to_string()]
        );
    }
}
