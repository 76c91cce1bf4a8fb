//! Flow matcher over component metadata.
//!
//! `match` fields are patterns: the component's `$metadata` must hold each
//! field and the pattern must admit it. `exclude` fields disqualify a
//! component when any of their subfields is equal to the component's
//! corresponding metadata subfield.

use stackflow_core::{CoreError, Document, Path, Tree};

/// Errors raised by malformed flow definitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// `match` or `exclude` is not a struct
    #[error("`{section}` must be a struct, got {found}")]
    NotAStruct {
        /// Offending section
        section: String,
        /// What was found instead
        found: String,
    },

    /// `pipeline` is not a list
    #[error("`pipeline` must be a list of transformer steps")]
    NotAList,

    /// A pattern cannot be used for matching
    #[error("Invalid pattern at {path}: {reason}")]
    InvalidPattern {
        /// Pattern location
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// A transformer step exposes no `output`
    #[error("Transformer step {step} has no `output` field")]
    MissingOutput {
        /// Step index in the pipeline
        step: usize,
    },

    /// The component's metadata does not evaluate
    #[error(transparent)]
    Document(#[from] CoreError),
}

/// Match/exclude predicate pair
#[derive(Debug, Clone)]
pub struct Matcher<D: Document = Tree> {
    include: D,
    exclude: D,
}

impl<D: Document> Matcher<D> {
    /// Create a matcher from `match` and `exclude` documents
    ///
    /// # Errors
    ///
    /// Returns error if either document is not a struct
    pub fn new(include: D, exclude: D) -> Result<Self, MatchError> {
        ensure_struct("match", &include)?;
        ensure_struct("exclude", &exclude)?;
        Ok(Self { include, exclude })
    }

    /// A matcher that accepts every component
    #[must_use]
    pub fn any() -> Self {
        Self {
            include: D::empty(),
            exclude: D::empty(),
        }
    }

    /// Whether a flow with this predicate applies to `component`
    ///
    /// # Errors
    ///
    /// Returns error if a `match` pattern contains an unresolved reference
    /// or the component's metadata embeds conflict
    pub fn matches(&self, component: &D) -> Result<bool, MatchError> {
        let metadata = component.try_lookup(&Path::root().field("$metadata"))?;

        for (name, pattern) in self.include.fields() {
            let Some(actual) = metadata.as_ref().and_then(|m| m.lookup(&Path::root().field(name.as_str())))
            else {
                return Ok(false);
            };
            let admitted = pattern
                .admits(&actual)
                .map_err(|err| invalid_pattern("match", &name, &err))?;
            if !admitted {
                return Ok(false);
            }
        }

        let Some(metadata) = metadata else {
            return Ok(true);
        };
        for (name, excluded) in self.exclude.fields() {
            let Some(actual) = metadata.lookup(&Path::root().field(name.as_str())) else {
                continue;
            };
            for (sub, excluded_value) in excluded.fields() {
                let hit = actual
                    .lookup(&Path::root().field(sub.as_str()))
                    .is_some_and(|value| value.equals(&excluded_value));
                if hit {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// The `match` document
    #[must_use]
    pub fn include(&self) -> &D {
        &self.include
    }

    /// The `exclude` document
    #[must_use]
    pub fn exclude(&self) -> &D {
        &self.exclude
    }
}

fn ensure_struct<D: Document>(section: &str, doc: &D) -> Result<(), MatchError> {
    let json = doc.to_json();
    if json.is_object() {
        Ok(())
    } else {
        Err(MatchError::NotAStruct {
            section: section.to_string(),
            found: json.to_string(),
        })
    }
}

fn invalid_pattern(section: &str, field: &str, err: &CoreError) -> MatchError {
    let path = match err {
        CoreError::Validation { field: inner, .. } if !inner.is_empty() => {
            format!("{}.{}.{}", section, field, inner)
        }
        _ => format!("{}.{}", section, field),
    };
    let reason = match err {
        CoreError::Validation { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    MatchError::InvalidPattern { path, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn tree(json: serde_json::Value) -> Tree {
        Tree::from_json(&json).unwrap()
    }

    fn matcher() -> Matcher {
        Matcher::new(
            tree(json!({"traits": {"balabizo": null, "tada": 123}})),
            tree(json!({"labels": {"tada": "abc", "toto": 123}})),
        )
        .unwrap()
    }

    #[test]
    fn test_match_exact_traits() {
        let component = tree(json!({"$metadata": {"traits": {
            "balabizo": null, "tada": 123, "bla": null,
        }}}));
        assert!(matcher().matches(&component).unwrap());
    }

    #[test]
    fn test_missing_trait_does_not_match() {
        let component = tree(json!({"$metadata": {"traits": {"balabizo": null, "bla": null}}}));
        assert!(!matcher().matches(&component).unwrap());
    }

    #[test]
    fn test_different_trait_value_does_not_match() {
        let component = tree(json!({"$metadata": {"traits": {"balabizo": null, "tada": null}}}));
        assert!(!matcher().matches(&component).unwrap());
    }

    #[test]
    fn test_excluded_label() {
        let component = tree(json!({"$metadata": {
            "traits": {"balabizo": null, "tada": 123},
            "labels": {"toto": 123},
        }}));
        assert!(!matcher().matches(&component).unwrap());
    }

    #[test]
    fn test_workload_trait_required() {
        let matcher = Matcher::new(tree(json!({"traits": {"workload": {}}})), Tree::empty()).unwrap();
        let without = tree(json!({"$metadata": {"traits": {"exposable": {}}}}));
        assert!(!matcher.matches(&without).unwrap());
        let with = tree(json!({"$metadata": {"traits": {"workload": {"image": "nginx"}}}}));
        assert!(matcher.matches(&with).unwrap());
    }

    #[test]
    fn test_incomplete_metadata_never_matches() {
        let matcher = Matcher::new(tree(json!({"labels": {"tier": "${string}"}})), Tree::empty()).unwrap();
        let incomplete = tree(json!({"$metadata": {"labels": {"tier": "${string}"}}}));
        assert!(!matcher.matches(&incomplete).unwrap());
        let concrete = tree(json!({"$metadata": {"labels": {"tier": "web"}}}));
        assert!(matcher.matches(&concrete).unwrap());
    }

    #[test]
    fn test_empty_matcher_matches_everything() {
        let matcher: Matcher<Tree> = Matcher::any();
        assert!(matcher.matches(&tree(json!({"x": 1}))).unwrap());
        assert!(matcher.matches(&tree(json!({"$metadata": {"id": "a"}}))).unwrap());
    }

    #[test]
    fn test_exclude_uses_equality_not_subsumption() {
        // an open pattern in `exclude` is not equal to concrete data, so it
        // does not disqualify; subsumption would
        let excluded = tree(json!({"tier": "${string}"}));
        let matcher = Matcher::new(Tree::empty(), tree(json!({"labels": {"tier": "${string}"}}))).unwrap();
        let component = tree(json!({"$metadata": {"labels": {"tier": "web"}}}));
        assert!(matcher.matches(&component).unwrap());

        let labels = component.lookup(&Path::parse("$metadata.labels").unwrap()).unwrap();
        assert!(excluded.admits(&labels).unwrap());
    }

    #[test]
    fn test_conflicting_metadata_is_error() {
        let component = tree(json!({"$metadata": {
            "labels": {"tier": "web"},
            "<<": {"labels": {"tier": "db"}},
        }}));
        let matcher: Matcher<Tree> = Matcher::any();
        match matcher.matches(&component).unwrap_err() {
            MatchError::Document(err) => assert!(err.is_conflict()),
            other => panic!("expected fill conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_non_struct_sections_rejected() {
        let err = Matcher::new(tree(json!("workload")), Tree::empty()).unwrap_err();
        assert!(matches!(err, MatchError::NotAStruct { .. }));
        let err = Matcher::new(Tree::empty(), tree(json!([1]))).unwrap_err();
        assert!(matches!(err, MatchError::NotAStruct { .. }));
    }

    #[test]
    fn test_reference_in_pattern_is_error() {
        let matcher = Matcher::new(tree(json!({"labels": {"tier": "${elsewhere}"}})), Tree::empty()).unwrap();
        let component = tree(json!({"$metadata": {"labels": {"tier": "web"}}}));
        let err = matcher.matches(&component).unwrap_err();
        match err {
            MatchError::InvalidPattern { path, .. } => assert_eq!(path, "match.labels.tier"),
            other => panic!("expected invalid pattern, got {:?}", other),
        }
    }

    fn labels() -> impl Strategy<Value = std::collections::BTreeMap<String, String>> {
        proptest::collection::btree_map("[a-z]{1,6}", "[a-z]{1,6}", 1..5)
    }

    proptest! {
        #[test]
        fn prop_own_labels_match_and_exclude(labels in labels()) {
            let component = tree(json!({"$metadata": {"labels": labels}}));
            let include = Matcher::new(tree(json!({"labels": labels})), Tree::empty()).unwrap();
            prop_assert!(include.matches(&component).unwrap());
            let exclude = Matcher::new(Tree::empty(), tree(json!({"labels": labels}))).unwrap();
            prop_assert!(!exclude.matches(&component).unwrap());
        }
    }
}
