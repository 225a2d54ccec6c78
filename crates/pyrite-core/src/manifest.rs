use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use pyrite_util::errors::PyriteError;

use crate::marker::Environment;
use crate::requirement::{DependencySpec, Requirement};

/// The parsed representation of a `Pyrite.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub package: PackageMetadata,

    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    /// Target environment used for marker evaluation. Defaults describe
    /// a current CPython on Linux.
    #[serde(default)]
    pub environment: Environment,

    /// Additional package indexes by name. The public index is appended
    /// when not declared.
    #[serde(default)]
    pub indexes: BTreeMap<String, String>,
}

/// Package identity from the `[package]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Manifest {
    /// Load and parse a `Pyrite.toml` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PyriteError::Manifest {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    /// Parse manifest TOML content.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            PyriteError::Manifest {
                message: format!("Failed to parse Pyrite.toml: {e}"),
            }
            .into()
        })
    }

    /// The declared top-level requirements, in deterministic name order.
    pub fn requirements(&self) -> Result<Vec<Requirement>, PyriteError> {
        self.dependencies
            .iter()
            .map(|(name, spec)| Requirement::from_spec(name, spec))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_manifest() {
        let manifest = Manifest::parse_toml(
            r#"
[package]
name = "my-app"
version = "0.1.0"
"#,
        )
        .unwrap();
        assert_eq!(manifest.package.name, "my-app");
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.environment.sys_platform, "linux");
    }

    #[test]
    fn dependencies_in_both_forms() {
        let manifest = Manifest::parse_toml(
            r#"
[package]
name = "my-app"
version = "0.1.0"

[dependencies]
requests = ">=2.0,<3.0"
httpx = { version = ">=0.27", extras = ["socks"], markers = 'python_version >= "3.9"' }
internal-lib = { version = "==1.4", index = "corp" }

[indexes]
corp = "https://pypi.corp.example/simple"
"#,
        )
        .unwrap();

        let reqs = manifest.requirements().unwrap();
        assert_eq!(reqs.len(), 3);
        // BTreeMap keys give deterministic name order.
        assert_eq!(reqs[0].name.as_str(), "httpx");
        assert_eq!(reqs[1].name.as_str(), "internal-lib");
        assert_eq!(reqs[2].name.as_str(), "requests");

        assert!(reqs[0].extras.contains("socks"));
        assert!(reqs[0].marker.is_some());
        assert_eq!(reqs[1].index.as_deref(), Some("corp"));
    }

    #[test]
    fn environment_overrides() {
        let manifest = Manifest::parse_toml(
            r#"
[package]
name = "my-app"
version = "0.1.0"

[environment]
python_version = "3.10"
sys_platform = "darwin"
"#,
        )
        .unwrap();
        assert_eq!(manifest.environment.python_version, "3.10");
        assert_eq!(manifest.environment.sys_platform, "darwin");
        // Unspecified fields keep their defaults.
        assert_eq!(manifest.environment.implementation_name, "cpython");
    }
}
