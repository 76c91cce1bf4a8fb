//! Generated-field materialization.
//!
//! Fields marked `@generate`, `@file(path)` or `@env(NAME)` that are still
//! incomplete are filled from their source: a file under the base
//! directory, an environment variable, or a deterministic placeholder.
//! Running the materializer twice is a no-op the second time.

use indexmap::IndexMap;
use stackflow_core::{CoreError, Directive, DirectiveField, Document, Kind, Path};
use std::path::{Path as FsPath, PathBuf};
use tracing::debug;

/// Placeholder for generated strings without a source
pub const DEFAULT_PLACEHOLDER: &str = "dummy";

/// Errors raised while materializing generated fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratedFieldError {
    /// `@env(NAME)` names an unset variable
    #[error("{path}: environment variable {name} is not set")]
    MissingEnv {
        /// Field path
        path: Path,
        /// Variable name
        name: String,
    },

    /// `@file(path)` cannot be read
    #[error("{path}: cannot read {file}: {reason}")]
    UnreadableFile {
        /// Field path
        path: Path,
        /// Requested file
        file: String,
        /// OS error
        reason: String,
    },

    /// `@file(path)` resolves outside the base directory
    #[error("{path}: {file} is outside the base directory")]
    UnsafePath {
        /// Field path
        path: Path,
        /// Requested file
        file: String,
    },

    /// The source text does not fit the field's kind
    #[error("{path}: cannot use {value:?} as {kind}")]
    BadValue {
        /// Field path
        path: Path,
        /// Expected kind keyword
        kind: String,
        /// Source text
        value: String,
    },

    /// Filling the generated value failed
    #[error(transparent)]
    Document(#[from] CoreError),
}

/// Resolves generated fields from files, variables and placeholders
#[derive(Debug, Clone)]
pub struct Materializer {
    base_dir: PathBuf,
    placeholder: String,
    vars: IndexMap<String, String>,
}

impl Materializer {
    /// Create a materializer reading files under `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            vars: IndexMap::new(),
        }
    }

    /// Set the string placeholder
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Variables consulted before the process environment
    #[must_use]
    pub fn with_vars(mut self, vars: IndexMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    /// Base directory for `@file`
    #[must_use]
    pub fn base_dir(&self) -> &FsPath {
        &self.base_dir
    }

    /// Fill every incomplete generated field of `doc`
    ///
    /// A generated field written as a reference is filled through the
    /// reference: the value lands on the target when the target is declared
    /// in `doc`, and replaces the reference otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if a source is missing, unsafe, or does not fit the
    /// field, or if the value conflicts with the document
    pub fn materialize<D: Document>(&self, doc: &D) -> Result<D, GeneratedFieldError> {
        let pending: Vec<DirectiveField> = doc
            .directive_fields()
            .into_iter()
            .filter(|f| f.is_generated() && !f.concrete)
            .collect();

        let mut doc = doc.clone();
        for field in pending {
            // an earlier fill may have completed this field through a reference
            if doc.lookup(&field.path).is_some_and(|v| v.is_concrete()) {
                continue;
            }
            let value = self.generate(&field)?;
            debug!(path = %field.path, value = %value, "Generated field");
            doc = doc.fill(&field.path, &D::from_json(&value)?)?;
        }
        Ok(doc)
    }

    fn generate(&self, field: &DirectiveField) -> Result<serde_json::Value, GeneratedFieldError> {
        let kind = field.kind.unwrap_or(Kind::Top);
        let file = field.directives.iter().find_map(|d| match d {
            Directive::FromFile(file) => Some(file),
            _ => None,
        });
        let env = field.directives.iter().find_map(|d| match d {
            Directive::FromEnv(name) => Some(name),
            _ => None,
        });

        if let Some(file) = file {
            let text = self.read_file(&field.path, file)?;
            return convert(&field.path, kind, &text);
        }
        if let Some(name) = env {
            let text = self
                .vars
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
                .ok_or_else(|| GeneratedFieldError::MissingEnv {
                    path: field.path.clone(),
                    name: name.clone(),
                })?;
            return convert(&field.path, kind, &text);
        }
        Ok(match kind {
            Kind::Int | Kind::Number => serde_json::Value::from(0),
            Kind::Bool => serde_json::Value::Bool(false),
            Kind::String | Kind::Top => serde_json::Value::String(self.placeholder.clone()),
        })
    }

    fn read_file(&self, path: &Path, file: &FsPath) -> Result<String, GeneratedFieldError> {
        let unreadable = |err: std::io::Error| GeneratedFieldError::UnreadableFile {
            path: path.clone(),
            file: file.display().to_string(),
            reason: err.to_string(),
        };
        let base = self.base_dir.canonicalize().map_err(unreadable)?;
        let target = base.join(file).canonicalize().map_err(unreadable)?;
        if !target.starts_with(&base) {
            return Err(GeneratedFieldError::UnsafePath {
                path: path.clone(),
                file: file.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(&target).map_err(unreadable)?;
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(".")
    }
}

fn convert(path: &Path, kind: Kind, text: &str) -> Result<serde_json::Value, GeneratedFieldError> {
    let bad = || GeneratedFieldError::BadValue {
        path: path.clone(),
        kind: kind.keyword().to_string(),
        value: text.to_string(),
    };
    let trimmed = text.trim();
    match kind {
        Kind::String | Kind::Top => Ok(serde_json::Value::String(text.to_string())),
        Kind::Int => trimmed
            .parse::<i64>()
            .map(serde_json::Value::from)
            .map_err(|_| bad()),
        Kind::Number => match trimmed.parse::<i64>() {
            Ok(n) => Ok(serde_json::Value::from(n)),
            Err(_) => trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .ok_or_else(bad),
        },
        Kind::Bool => trimmed
            .parse::<bool>()
            .map(serde_json::Value::Bool)
            .map_err(|_| bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use stackflow_core::Tree;

    fn tree(json: serde_json::Value) -> Tree {
        Tree::from_json(&json).unwrap()
    }

    #[test]
    fn test_placeholders_by_kind() {
        let doc = tree(json!({
            "token": "${string @generate}",
            "port": "${int @generate}",
            "ratio": "${number @generate}",
            "enabled": "${bool @generate}",
            "anything": "${_ @generate}",
            "name": "${string}",
        }));
        let out = Materializer::default().materialize(&doc).unwrap();
        assert_eq!(
            out.to_json(),
            json!({
                "token": "dummy",
                "port": 0,
                "ratio": 0,
                "enabled": false,
                "anything": "dummy",
                "name": "${string}",
            })
        );
    }

    #[test]
    fn test_concrete_fields_untouched() {
        let doc = tree(json!({"token": "${string @generate}"}))
            .fill(&Path::parse("token").unwrap(), &tree(json!("secret")))
            .unwrap();
        let out = Materializer::default().materialize(&doc).unwrap();
        assert_eq!(out.to_json(), json!({"token": "secret"}));
    }

    #[test]
    fn test_env_source() {
        let vars = IndexMap::from([
            ("API_TOKEN".to_string(), "t0k3n".to_string()),
            ("REPLICAS".to_string(), "3".to_string()),
        ]);
        let doc = tree(json!({
            "token": "${string @env(API_TOKEN)}",
            "replicas": "${int @env(REPLICAS)}",
        }));
        let out = Materializer::default().with_vars(vars).materialize(&doc).unwrap();
        assert_eq!(out.to_json(), json!({"token": "t0k3n", "replicas": 3}));
    }

    #[test]
    fn test_missing_env_is_error() {
        let doc = tree(json!({"token": "${string @env(STACKFLOW_TEST_UNSET_VARIABLE_7Q)}"}));
        let err = Materializer::default().materialize(&doc).unwrap_err();
        assert!(matches!(err, GeneratedFieldError::MissingEnv { .. }));
    }

    #[test]
    fn test_env_value_must_fit_kind() {
        let vars = IndexMap::from([("PORT".to_string(), "eighty".to_string())]);
        let doc = tree(json!({"port": "${int @env(PORT)}"}));
        let err = Materializer::default().with_vars(vars).materialize(&doc).unwrap_err();
        assert_eq!(err.to_string(), "port: cannot use \"eighty\" as int");
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cert.pem"), "-----CERT-----\n").unwrap();
        let doc = tree(json!({"tls": {"cert": "${string @file(cert.pem)}"}}));
        let out = Materializer::new(dir.path()).materialize(&doc).unwrap();
        assert_eq!(out.to_json(), json!({"tls": {"cert": "-----CERT-----"}}));
    }

    #[test]
    fn test_file_outside_base_is_unsafe() {
        let outer = tempfile::tempdir().unwrap();
        let base = outer.path().join("project");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(outer.path().join("secret"), "x").unwrap();

        let doc = tree(json!({"s": "${string @file(../secret)}"}));
        let err = Materializer::new(&base).materialize(&doc).unwrap_err();
        assert!(matches!(err, GeneratedFieldError::UnsafePath { .. }));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = tree(json!({"s": "${string @file(nope.txt)}"}));
        let err = Materializer::new(dir.path()).materialize(&doc).unwrap_err();
        assert!(matches!(err, GeneratedFieldError::UnreadableFile { .. }));
    }

    #[test]
    fn test_reference_field_fills_its_target() {
        let doc = tree(json!({
            "source": "${string}",
            "copy": "${source @generate}",
        }));
        let out = Materializer::default().materialize(&doc).unwrap();
        assert!(out.is_concrete());
        assert_eq!(out.to_json(), json!({"source": "dummy", "copy": "dummy"}));
    }

    #[test]
    fn test_unresolved_reference_field_gets_placeholder() {
        let doc = tree(json!({"copy": "${elsewhere.host @generate}"}));
        let out = Materializer::default().materialize(&doc).unwrap();
        assert_eq!(out.to_json(), json!({"copy": "dummy"}));
    }

    #[test]
    fn test_generated_field_behind_output_alias() {
        // `output` aliases `input` and is declared first
        let step = tree(json!({"output": "${input}", "input": "${_}"}))
            .fill(
                &Path::parse("input").unwrap(),
                &tree(json!({"name": "api", "token": "${string @generate}"})),
            )
            .unwrap();
        let out = Materializer::default().materialize(&step).unwrap();
        assert!(out.is_concrete());
        assert_eq!(
            out.lookup(&Path::parse("output").unwrap()).unwrap().to_json(),
            json!({"name": "api", "token": "dummy"})
        );
    }

    #[test]
    fn test_custom_placeholder() {
        let doc = tree(json!({"name": "${string @generate}"}));
        let out = Materializer::default()
            .with_placeholder("changeme")
            .materialize(&doc)
            .unwrap();
        assert_eq!(out.to_json(), json!({"name": "changeme"}));
    }

    proptest! {
        #[test]
        fn prop_materialization_is_idempotent(
            kinds in proptest::collection::vec(
                prop_oneof![Just("string"), Just("int"), Just("number"), Just("bool"), Just("_")],
                1..6,
            ),
        ) {
            let mut fields = serde_json::Map::new();
            for (i, kind) in kinds.iter().enumerate() {
                fields.insert(format!("f{}", i), json!(format!("${{{} @generate}}", kind)));
            }
            let doc = tree(serde_json::Value::Object(fields));
            let materializer = Materializer::default();
            let once = materializer.materialize(&doc).unwrap();
            let twice = materializer.materialize(&once).unwrap();
            prop_assert!(once.is_concrete());
            prop_assert_eq!(once.to_json(), twice.to_json());
        }
    }
}
