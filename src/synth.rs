//! Cloud assembly: the synthesized templates plus a manifest, as written to
//! the output directory.
//!
//! Layout:
//!
//! ```text
//! cdk.out/
//!   manifest.json
//!   CdkLabNetworkStack.template.json
//!   CdkLabWebServerStack.template.json
//! ```

use crate::error::{Error, Result};
use crate::template::Template;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest file name inside an assembly directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "36.0.0";

const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

/// One synthesized stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackArtifact {
    /// Stack name
    pub name: String,
    /// `aws://account/region`
    pub environment: String,
    /// Stacks that must deploy first
    pub dependencies: Vec<String>,
    /// The template
    pub template: Template,
}

impl StackArtifact {
    /// File name of the template inside the assembly.
    pub fn template_file(&self) -> String {
        template_file_name(&self.name)
    }
}

/// `<Stack>.template.json`
pub fn template_file_name(stack: &str) -> String {
    format!("{}.template.json", stack)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    version: String,
    artifacts: IndexMap<String, ManifestArtifact>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestArtifact {
    #[serde(rename = "type")]
    artifact_type: String,
    environment: String,
    properties: ArtifactProperties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactProperties {
    template_file: String,
}

/// All stacks of an app, in dependency order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudAssembly {
    artifacts: Vec<StackArtifact>,
}

impl CloudAssembly {
    /// An empty assembly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stack. Its dependencies should already be present.
    pub fn add(&mut self, artifact: StackArtifact) {
        self.artifacts.push(artifact);
    }

    /// Stacks in dependency order.
    pub fn artifacts(&self) -> &[StackArtifact] {
        &self.artifacts
    }

    /// Look up a stack by name.
    pub fn stack(&self, name: &str) -> Result<&StackArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::StackNotFound(name.to_string()))
    }

    /// Write templates and manifest into `dir`, creating it if needed.
    /// Returns the manifest path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let mut artifacts = IndexMap::new();
        for artifact in &self.artifacts {
            let file = artifact.template_file();
            let path = dir.join(&file);
            fs::write(&path, artifact.template.to_json()? + "\n")?;
            debug!(path = %path.display(), "template written");

            artifacts.insert(
                artifact.name.clone(),
                ManifestArtifact {
                    artifact_type: STACK_ARTIFACT_TYPE.to_string(),
                    environment: artifact.environment.clone(),
                    properties: ArtifactProperties {
                        template_file: file,
                    },
                    dependencies: artifact.dependencies.clone(),
                },
            );
        }

        let manifest = Manifest {
            version: MANIFEST_VERSION.to_string(),
            artifacts,
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)? + "\n")?;

        info!(
            dir = %dir.display(),
            stacks = self.artifacts.len(),
            "cloud assembly written"
        );
        Ok(manifest_path)
    }

    /// Read an assembly previously written with [`CloudAssembly::write`].
    pub fn read(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(Error::FileNotFound(manifest_path));
        }
        let manifest: Manifest = serde_json::from_str(&fs::read_to_string(&manifest_path)?)?;

        let mut assembly = Self::new();
        for (name, artifact) in manifest.artifacts {
            if artifact.artifact_type != STACK_ARTIFACT_TYPE {
                continue;
            }
            let template = Template::load(&dir.join(&artifact.properties.template_file))?;
            assembly.add(StackArtifact {
                name,
                environment: artifact.environment,
                dependencies: artifact.dependencies,
                template,
            });
        }
        Ok(assembly)
    }
}
