//! Environment (stack builder) definitions.
//!
//! Each environment under the builders section carries an ordered list of
//! flows, optional extra components merged into the stack before
//! transformation, and optional per-driver output locations.

use crate::flow::Flow;
use crate::matcher::MatchError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackflow_core::{Document, EnvironmentName, Path, Tree};
use std::path::PathBuf;
use tracing::debug;

/// Default location of the environments section
pub const DEFAULT_BUILDERS_PATH: &str = "environments";

/// Errors raised while reading environments
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    /// A section that must be a struct is not
    #[error("{path} must be a struct")]
    NotAStruct {
        /// Offending path
        path: String,
    },

    /// A flow inside an environment is malformed
    #[error("Environment {environment}: flow {flow}: {source}")]
    Flow {
        /// Environment name
        environment: String,
        /// Flow name or index
        flow: String,
        /// Underlying error
        source: MatchError,
    },

    /// `driverOutputConfig` does not have the expected shape
    #[error("Environment {environment}: invalid driverOutputConfig: {reason}")]
    DriverConfig {
        /// Environment name
        environment: String,
        /// Decoder message
        reason: String,
    },

    /// No environment with this name
    #[error("Environment not found: {name}")]
    NotFound {
        /// Requested name
        name: String,
    },
}

/// Where a driver writes its output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Output file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Per-driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOutputConfig {
    /// Output location
    #[serde(default)]
    pub output: OutputConfig,
}

/// One environment
#[derive(Debug, Clone)]
pub struct Environment<D: Document = Tree> {
    name: EnvironmentName,
    flows: Vec<Flow<D>>,
    additional_components: Option<D>,
    driver_output: IndexMap<String, DriverOutputConfig>,
}

impl<D: Document> Environment<D> {
    /// Parse the environment stored at `path`
    ///
    /// # Errors
    ///
    /// Returns error if a flow or the driver config is malformed
    pub fn parse(root: &D, path: &Path, name: EnvironmentName) -> Result<Self, EnvironmentError> {
        let flows_path = path.field("flows");
        let mut flows = Vec::new();
        if let Some(section) = root.lookup(&flows_path) {
            let json = section.to_json();
            if json.is_array() {
                for i in 0..section.elements().len() {
                    let flow = Flow::parse(root, &flows_path.index(i))
                        .map_err(|source| flow_error(&name, &i.to_string(), source))?;
                    flows.push(flow);
                }
            } else if json.is_object() {
                for (key, _) in section.fields() {
                    let flow = Flow::parse(root, &flows_path.field(key.as_str()))
                        .map_err(|source| flow_error(&name, &key, source))?;
                    flows.push(flow.with_name(key));
                }
            } else {
                return Err(EnvironmentError::NotAStruct {
                    path: flows_path.to_string(),
                });
            }
        }

        let additional_path = path.field("additionalComponents");
        let additional_components = root.detach(&additional_path);
        if let Some(extra) = &additional_components {
            if !extra.to_json().is_object() {
                return Err(EnvironmentError::NotAStruct {
                    path: additional_path.to_string(),
                });
            }
        }

        let driver_output = match root.lookup(&path.field("driverOutputConfig")) {
            Some(config) => serde_json::from_value(config.to_json()).map_err(|err| {
                EnvironmentError::DriverConfig {
                    environment: name.to_string(),
                    reason: err.to_string(),
                }
            })?,
            None => IndexMap::new(),
        };

        debug!(
            environment = %name,
            flows = flows.len(),
            additional = additional_components.is_some(),
            "Parsed environment"
        );
        Ok(Self {
            name,
            flows,
            additional_components,
            driver_output,
        })
    }

    /// Environment name
    #[must_use]
    pub fn name(&self) -> &EnvironmentName {
        &self.name
    }

    /// Flows in declaration order
    #[must_use]
    pub fn flows(&self) -> &[Flow<D>] {
        &self.flows
    }

    /// Components merged into the stack before transformation
    #[must_use]
    pub fn additional_components(&self) -> Option<&D> {
        self.additional_components.as_ref()
    }

    /// Configured driver outputs
    #[must_use]
    pub fn driver_output(&self) -> &IndexMap<String, DriverOutputConfig> {
        &self.driver_output
    }

    /// Output directory for `driver`, defaulting to `build/<env>/<driver>`
    #[must_use]
    pub fn output_dir(&self, driver: &str) -> PathBuf {
        self.driver_output
            .get(driver)
            .and_then(|config| config.output.dir.clone())
            .map_or_else(
                || PathBuf::from("build").join(self.name.as_str()).join(driver),
                PathBuf::from,
            )
    }

    /// Output file name for `driver`, defaulting to `<driver>.<extension>`
    #[must_use]
    pub fn output_file(&self, driver: &str, extension: &str) -> String {
        self.driver_output
            .get(driver)
            .and_then(|config| config.output.file.clone())
            .unwrap_or_else(|| format!("{}.{}", driver, extension))
    }
}

fn flow_error(environment: &EnvironmentName, flow: &str, source: MatchError) -> EnvironmentError {
    EnvironmentError::Flow {
        environment: environment.to_string(),
        flow: flow.to_string(),
        source,
    }
}

/// All environments of a project, in declaration order
#[derive(Debug, Clone)]
pub struct Environments<D: Document = Tree> {
    environments: IndexMap<EnvironmentName, Environment<D>>,
}

impl<D: Document> Environments<D> {
    /// Parse every environment under `builders_path`
    ///
    /// A missing section yields no environments.
    ///
    /// # Errors
    ///
    /// Returns error if the section or one of its environments is malformed
    pub fn parse(root: &D, builders_path: &Path) -> Result<Self, EnvironmentError> {
        let mut environments = IndexMap::new();
        let Some(section) = root.lookup(builders_path) else {
            return Ok(Self { environments });
        };
        if !section.to_json().is_object() {
            return Err(EnvironmentError::NotAStruct {
                path: builders_path.to_string(),
            });
        }

        for (key, _) in section.fields() {
            let name = EnvironmentName::new(key.as_str());
            let env = Environment::parse(root, &builders_path.field(key.as_str()), name.clone())?;
            environments.insert(name, env);
        }
        Ok(Self { environments })
    }

    /// Environment by name
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentError::NotFound` for unknown names
    pub fn get(&self, name: &str) -> Result<&Environment<D>, EnvironmentError> {
        self.environments
            .get(name)
            .ok_or_else(|| EnvironmentError::NotFound {
                name: name.to_string(),
            })
    }

    /// Environment names in declaration order
    #[must_use]
    pub fn names(&self) -> Vec<&EnvironmentName> {
        self.environments.keys().collect()
    }

    /// Iterate environments in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Environment<D>> {
        self.environments.values()
    }

    /// Number of environments
    #[must_use]
    pub fn len(&self) -> usize {
        self.environments.len()
    }

    /// Whether no environment is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}
