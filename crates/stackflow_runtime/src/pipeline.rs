//! Transformation pipeline runner.
//!
//! Applies one flow to one component by folding the flow's steps left to
//! right. Each step is a fresh copy of its template: `context.dependencies`
//! and `input` are filled, generated fields are materialized, and the
//! evaluated `output` becomes the running component.

use crate::error::BuildError;
use crate::generate::Materializer;
use stackflow_core::{ComponentId, Document, Path};
use stackflow_plan::Stack;
use stackflow_policy::{Flow, MatchError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Component produced by running one flow
#[derive(Debug, Clone)]
pub struct FlowRun<D> {
    /// The running component after the flow
    pub component: D,
    /// Whether the flow matched and its pipeline was applied
    pub matched: bool,
}

/// Runs flows against components
#[derive(Debug, Clone)]
pub struct PipelineRunner<'a> {
    materializer: &'a Materializer,
    cancel: CancellationToken,
}

impl<'a> PipelineRunner<'a> {
    /// Create a runner
    #[must_use]
    pub fn new(materializer: &'a Materializer, cancel: CancellationToken) -> Self {
        Self {
            materializer,
            cancel,
        }
    }

    /// Apply `flow` to `component`, the current state of task `id`
    ///
    /// The component comes back unchanged, with `matched` unset, when the
    /// flow does not match.
    ///
    /// # Errors
    ///
    /// Returns error on fill conflicts, malformed steps, generated-field
    /// failures or cancellation
    pub fn run<D: Document>(
        &self,
        flow: &Flow<D>,
        stack: &Stack<D>,
        id: &ComponentId,
        component: D,
    ) -> Result<FlowRun<D>, BuildError> {
        if !flow.matches(&component)? {
            debug!(component = %id, flow = flow.name().unwrap_or("-"), "Flow does not match");
            return Ok(FlowRun {
                component,
                matched: false,
            });
        }

        let dependencies = stack.get_dependencies(id)?;
        let dependencies = D::from_json(&serde_json::Value::from(
            dependencies
                .iter()
                .map(|dep| dep.as_str().to_string())
                .collect::<Vec<_>>(),
        ))?;

        let mut current = component;
        for (index, template) in flow.pipeline().iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            current = self.apply_step(template, &dependencies, &current, index)?;
            debug!(component = %id, step = index, "Applied transformer step");
        }
        Ok(FlowRun {
            component: current,
            matched: true,
        })
    }

    /// Apply one step template to `input`
    ///
    /// # Errors
    ///
    /// Returns error if the step conflicts with the input, has no output or
    /// a generated field cannot be resolved
    pub fn apply_step<D: Document>(
        &self,
        template: &D,
        dependencies: &D,
        input: &D,
        index: usize,
    ) -> Result<D, BuildError> {
        let step = template
            .fill(&Path::root().field("context").field("dependencies"), dependencies)?
            .fill(&Path::root().field("input"), input)?;
        let step = self.materializer.materialize(&step)?.evaluate()?;

        let output = step
            .lookup(&Path::root().field("output"))
            .ok_or(MatchError::MissingOutput { step: index })?;
        Ok(self.materializer.materialize(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackflow_core::Tree;
    use stackflow_policy::Environments;

    fn tree(json: serde_json::Value) -> Tree {
        Tree::from_json(&json).unwrap()
    }

    fn transformer() -> serde_json::Value {
        json!({
            "context": {"field1": "${string}", "gen": "${string @generate}"},
            "input": {"field1": "${int}", "field2": "${int}"},
            "output": {
                "<<": "${input}",
                "field3": "${input.field1}",
                "$resources": {"a": {"c": "${context.field1}", "d": "${context.gen}"}},
            },
        })
    }

    #[test]
    fn test_apply_step() {
        let materializer = Materializer::default();
        let runner = PipelineRunner::new(&materializer, CancellationToken::new());
        let template = tree(transformer())
            .fill(&Path::parse("context.field1").unwrap(), &tree(json!("canary")))
            .unwrap();
        let out = runner
            .apply_step(&template, &tree(json!([])), &tree(json!({"field1": 1, "field2": 2})), 0)
            .unwrap();
        assert_eq!(
            out.to_json(),
            json!({
                "field1": 1,
                "field2": 2,
                "field3": 1,
                "$resources": {"a": {"c": "canary", "d": "dummy"}},
            })
        );
    }

    #[test]
    fn test_step_conflicting_with_input() {
        let materializer = Materializer::default();
        let runner = PipelineRunner::new(&materializer, CancellationToken::new());
        let err = runner
            .apply_step(&tree(transformer()), &tree(json!([])), &tree(json!({"field1": "one"})), 0)
            .unwrap_err();
        match err {
            BuildError::Document(inner) => assert!(inner.is_conflict()),
            other => panic!("expected fill conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_step_without_output() {
        let materializer = Materializer::default();
        let runner = PipelineRunner::new(&materializer, CancellationToken::new());
        let err = runner
            .apply_step(&tree(json!({"input": "${_}"})), &tree(json!([])), &tree(json!({})), 3)
            .unwrap_err();
        assert_eq!(err, BuildError::Match(MatchError::MissingOutput { step: 3 }));
    }

    #[test]
    fn test_step_with_output_declared_first() {
        let materializer = Materializer::default();
        let runner = PipelineRunner::new(&materializer, CancellationToken::new());
        let template = tree(json!({"output": "${input}", "input": "${_}"}));
        let out = runner
            .apply_step(
                &template,
                &tree(json!([])),
                &tree(json!({"name": "api", "token": "${string @generate}"})),
                0,
            )
            .unwrap();
        assert_eq!(out.to_json(), json!({"name": "api", "token": "dummy"}));
    }

    fn project() -> Tree {
        tree(json!({
            "components": {
                "db": {"$metadata": {"id": "db", "traits": {"database": null}}, "host": "db.local"},
                "web": {
                    "$metadata": {"id": "web", "traits": {"workload": null}},
                    "image": "nginx",
                    "token": "${string @generate}",
                    "database": "${db.host}",
                },
            },
            "transformers": {
                "deploy": {
                    "$metadata": {"traits": {"workload": null}},
                    "context": {"dependencies": "${_}"},
                    "input": {"image": "${string}"},
                    "output": {
                        "<<": "${input}",
                        "$resources": {"deployment": {
                            "$metadata": {"labels": {"driver": "json"}},
                            "image": "${input.image}",
                            "after": "${context.dependencies}",
                        }},
                    },
                },
                "label": {
                    "input": "${_}",
                    "output": {"<<": "${input}", "$metadata": {"labels": {"managed": true}}},
                },
            },
            "environments": {"dev": {"flows": [
                {"match": {"traits": {"workload": null}}, "pipeline": [
                    "${transformers.deploy}",
                    "${transformers.label}",
                ]},
            ]}},
        }))
    }

    #[test]
    fn test_run_flow_with_dependencies() {
        let root = project();
        let stack = Stack::new(root.clone()).unwrap();
        let envs = Environments::parse(&root, &Path::parse("environments").unwrap()).unwrap();
        let flow = &envs.get("dev").unwrap().flows()[0];

        let materializer = Materializer::default();
        let runner = PipelineRunner::new(&materializer, CancellationToken::new());
        let id = ComponentId::new("web");
        let web = stack.get_component(&id).unwrap();
        let run = runner.run(flow, &stack, &id, web).unwrap();
        assert!(run.matched);
        let out = run.component;

        assert!(out.is_concrete());
        let json = out.to_json();
        assert_eq!(json["token"], json!("dummy"));
        assert_eq!(json["database"], json!("db.local"));
        assert_eq!(json["$metadata"]["labels"]["managed"], json!(true));
        assert_eq!(
            json["$resources"]["deployment"],
            json!({
                "$metadata": {"labels": {"driver": "json"}},
                "image": "nginx",
                "after": ["db"],
            })
        );
    }

    #[test]
    fn test_run_skips_unmatched_component() {
        let root = project();
        let stack = Stack::new(root.clone()).unwrap();
        let envs = Environments::parse(&root, &Path::parse("environments").unwrap()).unwrap();
        let flow = &envs.get("dev").unwrap().flows()[0];

        let materializer = Materializer::default();
        let runner = PipelineRunner::new(&materializer, CancellationToken::new());
        let id = ComponentId::new("db");
        let db = stack.get_component(&id).unwrap();
        let run = runner.run(flow, &stack, &id, db.clone()).unwrap();
        assert!(!run.matched);
        assert!(run.component.equals(&db));
    }

    #[test]
    fn test_run_cancelled() {
        let root = project();
        let stack = Stack::new(root.clone()).unwrap();
        let envs = Environments::parse(&root, &Path::parse("environments").unwrap()).unwrap();
        let flow = &envs.get("dev").unwrap().flows()[0];

        let materializer = Materializer::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = PipelineRunner::new(&materializer, cancel);
        let id = ComponentId::new("web");
        let web = stack.get_component(&id).unwrap();
        assert_eq!(runner.run(flow, &stack, &id, web).unwrap_err(), BuildError::Cancelled);
    }
}
