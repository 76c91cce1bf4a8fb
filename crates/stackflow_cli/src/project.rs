//! Project loading.
//!
//! A project is one JSON or YAML document holding the components and the
//! environments. A directory is searched for `stackflow.yaml`,
//! `stackflow.yml` and `stackflow.json`, in that order.

use stackflow_core::{CoreError, Document, Path, Tree};
use stackflow_plan::{GraphError, Stack};
use stackflow_policy::{EnvironmentError, Environments};
use std::path::{Path as FsPath, PathBuf};
use tracing::debug;

/// File names looked up inside a project directory
pub const PROJECT_FILES: [&str; 3] = ["stackflow.yaml", "stackflow.yml", "stackflow.json"];

/// Errors raised while loading a project
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// No project file in the directory
    #[error("No project file in {}: expected one of {}", .dir.display(), PROJECT_FILES.join(", "))]
    NotFound {
        /// Searched directory
        dir: PathBuf,
    },

    /// The file cannot be read
    #[error("Cannot read {}: {source}", .path.display())]
    Read {
        /// Project file
        path: PathBuf,
        /// OS error
        source: std::io::Error,
    },

    /// The file is not valid JSON or YAML
    #[error("Cannot parse {}: {reason}", .path.display())]
    Parse {
        /// Project file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// An expression inside the document is malformed
    #[error("Invalid document {}: {source}", .path.display())]
    Document {
        /// Project file
        path: PathBuf,
        /// Underlying error
        source: CoreError,
    },
}

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    file: PathBuf,
    root: Tree,
}

impl Project {
    /// Load the project at `path`, a file or a directory
    ///
    /// # Errors
    ///
    /// Returns error if no file is found or it cannot be parsed
    pub fn load(path: &FsPath) -> Result<Self, ProjectError> {
        let file = if path.is_dir() {
            PROJECT_FILES
                .iter()
                .map(|name| path.join(name))
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| ProjectError::NotFound {
                    dir: path.to_path_buf(),
                })?
        } else {
            path.to_path_buf()
        };

        let text = std::fs::read_to_string(&file).map_err(|source| ProjectError::Read {
            path: file.clone(),
            source,
        })?;
        let json = parse_text(&file, &text)?;
        let root = Tree::from_json(&json).map_err(|source| ProjectError::Document {
            path: file.clone(),
            source,
        })?;
        debug!(file = %file.display(), "Loaded project");
        Ok(Self { file, root })
    }

    /// Project file
    #[must_use]
    pub fn file(&self) -> &FsPath {
        &self.file
    }

    /// Directory holding the project file; `@file` paths resolve here
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), FsPath::to_path_buf)
    }

    /// The root document
    #[must_use]
    pub fn root(&self) -> &Tree {
        &self.root
    }

    /// Build the component stack
    ///
    /// # Errors
    ///
    /// Returns error if the dependency graph cannot be built
    pub fn stack(&self, stack_path: &Path) -> Result<Stack, GraphError> {
        Stack::with_components_path(self.root.clone(), stack_path.clone())
    }

    /// Parse every environment
    ///
    /// # Errors
    ///
    /// Returns error if an environment is malformed
    pub fn environments(&self, builders_path: &Path) -> Result<Environments, EnvironmentError> {
        Environments::parse(&self.root, builders_path)
    }
}

fn parse_text(file: &FsPath, text: &str) -> Result<serde_json::Value, ProjectError> {
    let parse_error = |reason: String| ProjectError::Parse {
        path: file.to_path_buf(),
        reason,
    };
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(text).map_err(|err| parse_error(err.to_string())),
        _ => serde_yaml::from_str(text).map_err(|err| parse_error(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
components:
  db:
    $metadata:
      id: db
    host: db.local
  web:
    $metadata:
      id: web
      traits:
        workload: null
    database: ${db.host}
environments:
  dev:
    flows: []
"#;

    #[test]
    fn test_load_yaml_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stackflow.yaml"), YAML).unwrap();

        let project = Project::load(dir.path()).unwrap();
        assert_eq!(project.base_dir(), dir.path());
        let stack = project.stack(&Path::parse("components").unwrap()).unwrap();
        let order: Vec<_> = stack.tasks().iter().map(|id| id.as_str()).collect();
        assert_eq!(order, vec!["db", "web"]);

        let envs = project.environments(&Path::parse("environments").unwrap()).unwrap();
        assert!(envs.get("dev").is_ok());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("project.json");
        std::fs::write(&file, r#"{"components": {"a": {"$metadata": {"id": "a"}, "x": 1}}}"#).unwrap();
        let project = Project::load(&file).unwrap();
        assert_eq!(project.file(), file.as_path());
        assert_eq!(project.root().to_json()["components"]["a"]["x"], serde_json::json!(1));
    }

    #[test]
    fn test_missing_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::load(dir.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stackflow.yaml");
        std::fs::write(&file, "components: [unclosed").unwrap();
        let err = Project::load(&file).unwrap_err();
        assert!(matches!(err, ProjectError::Parse { .. }));
    }
}
