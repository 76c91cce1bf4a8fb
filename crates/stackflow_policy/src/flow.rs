//! Flow definitions.
//!
//! A flow is a `match`/`exclude` predicate plus an ordered pipeline of
//! transformer steps. Steps are kept as detached templates so that their
//! `input` and `context` slots stay live until the pipeline runner fills
//! them.

use crate::matcher::{MatchError, Matcher};
use stackflow_core::{Document, Path, Tree};

/// A parsed flow
#[derive(Debug, Clone)]
pub struct Flow<D: Document = Tree> {
    name: Option<String>,
    matcher: Matcher<D>,
    pipeline: Vec<D>,
}

impl<D: Document> Flow<D> {
    /// Parse the flow stored at `path` inside `root`
    ///
    /// Absent `match` or `exclude` sections match everything.
    ///
    /// # Errors
    ///
    /// Returns error if a section has the wrong shape
    pub fn parse(root: &D, path: &Path) -> Result<Self, MatchError> {
        let include = root
            .lookup(&path.field("match"))
            .unwrap_or_else(D::empty);
        let exclude = root
            .lookup(&path.field("exclude"))
            .unwrap_or_else(D::empty);
        let matcher = Matcher::new(include, exclude)?;

        let pipeline_path = path.field("pipeline");
        let pipeline = match root.lookup(&pipeline_path) {
            None => Vec::new(),
            Some(list) if list.to_json().is_array() => (0..list.elements().len())
                .filter_map(|i| root.detach(&pipeline_path.index(i)))
                .collect(),
            Some(_) => return Err(MatchError::NotAList),
        };

        Ok(Self {
            name: None,
            matcher,
            pipeline,
        })
    }

    /// Build a flow from parts
    #[must_use]
    pub fn new(matcher: Matcher<D>, pipeline: Vec<D>) -> Self {
        Self {
            name: None,
            matcher,
            pipeline,
        }
    }

    /// Set the flow name used in logs
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Flow name, if declared under a key
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this flow applies to `component`
    ///
    /// # Errors
    ///
    /// Returns error if a `match` pattern is malformed
    pub fn matches(&self, component: &D) -> Result<bool, MatchError> {
        self.matcher.matches(component)
    }

    /// The predicate
    #[must_use]
    pub fn matcher(&self) -> &Matcher<D> {
        &self.matcher
    }

    /// Transformer step templates in order
    #[must_use]
    pub fn pipeline(&self) -> &[D] {
        &self.pipeline
    }

    /// Traits declared by the pipeline steps
    ///
    /// A step declares traits in its own `$metadata.traits` or in the
    /// `$metadata.traits` its `input` requires, either as a struct keyed by
    /// trait name or as a list of names.
    #[must_use]
    pub fn handled_traits(&self) -> Vec<String> {
        let own = Path::root().field("$metadata").field("traits");
        let required = Path::root().field("input").join(&own);

        let mut traits: Vec<String> = Vec::new();
        for step in &self.pipeline {
            for path in [&own, &required] {
                let Some(declared) = step.lookup(path) else {
                    continue;
                };
                for name in trait_names(&declared) {
                    if !traits.contains(&name) {
                        traits.push(name);
                    }
                }
            }
        }
        traits
    }

    /// Whether a pipeline step declares `trait_name`
    #[must_use]
    pub fn handles(&self, trait_name: &str) -> bool {
        self.handled_traits().iter().any(|t| t == trait_name)
    }
}

/// Trait names declared by a `traits` value
pub(crate) fn trait_names<D: Document>(traits: &D) -> Vec<String> {
    let fields = traits.fields();
    if fields.is_empty() {
        traits.string_list()
    } else {
        fields.into_iter().map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(json: serde_json::Value) -> Tree {
        Tree::from_json(&json).unwrap()
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_flow() {
        let root = tree(json!({"flow": {
            "match": {"traits": {"workload": null}},
            "exclude": {"labels": {"skip": true}},
            "pipeline": [
                {"$metadata": {"traits": {"workload": null}}, "input": "${_}", "output": "${input}"},
                {"input": "${_}", "output": "${input}"},
            ],
        }}));
        let flow = Flow::parse(&root, &p("flow")).unwrap();
        assert_eq!(flow.pipeline().len(), 2);
        assert_eq!(flow.handled_traits(), vec!["workload"]);
        assert!(flow.handles("workload"));
        assert!(!flow.handles("exposable"));

        let web = tree(json!({"$metadata": {"traits": {"workload": null}}}));
        assert!(flow.matches(&web).unwrap());
        let skipped = tree(json!({"$metadata": {
            "traits": {"workload": null},
            "labels": {"skip": true},
        }}));
        assert!(!flow.matches(&skipped).unwrap());
    }

    #[test]
    fn test_absent_sections_match_everything() {
        let root = tree(json!({"flow": {"pipeline": []}}));
        let flow = Flow::parse(&root, &p("flow")).unwrap();
        assert!(flow.pipeline().is_empty());
        assert!(flow.matches(&tree(json!({"x": 1}))).unwrap());
    }

    #[test]
    fn test_pipeline_must_be_list() {
        let root = tree(json!({"flow": {"pipeline": {"step": {}}}}));
        assert_eq!(Flow::parse(&root, &p("flow")).unwrap_err(), MatchError::NotAList);
    }

    #[test]
    fn test_match_must_be_struct() {
        let root = tree(json!({"flow": {"match": "workload", "pipeline": []}}));
        let err = Flow::parse(&root, &p("flow")).unwrap_err();
        assert!(matches!(err, MatchError::NotAStruct { .. }));
    }

    #[test]
    fn test_traits_from_input_requirements_and_lists() {
        let root = tree(json!({"flow": {"pipeline": [
            {"input": {"$metadata": {"traits": {"exposable": null}}}, "output": {}},
            {"$metadata": {"traits": ["volumes", "exposable"]}, "input": "${_}", "output": {}},
        ]}}));
        let flow = Flow::parse(&root, &p("flow")).unwrap();
        assert_eq!(flow.handled_traits(), vec!["exposable", "volumes"]);
    }

    #[test]
    fn test_steps_stay_templates() {
        let root = tree(json!({
            "transformers": {"tag": {
                "input": "${_}",
                "output": {"<<": "${input}", "tagged": true},
            }},
            "flow": {"pipeline": ["${transformers.tag}"]},
        }));
        let flow = Flow::parse(&root, &p("flow")).unwrap();
        let step = flow.pipeline()[0]
            .fill(&p("input"), &tree(json!({"name": "web"})))
            .unwrap();
        assert_eq!(
            step.lookup(&p("output")).unwrap().to_json(),
            json!({"name": "web", "tagged": true})
        );
    }

    #[test]
    fn test_named_flow() {
        let flow: Flow = Flow::new(Matcher::any(), Vec::new()).with_name("expose");
        assert_eq!(flow.name(), Some("expose"));
    }
}
