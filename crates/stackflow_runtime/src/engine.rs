//! Stack/environment orchestrator.
//!
//! Drives every scheduled component through every flow of one environment,
//! writes the results back into the stack and enforces the final
//! invariant: each component is concrete and each of its resources names a
//! concrete driver.

use crate::error::{BuildError, IncompleteComponent};
use crate::generate::{Materializer, DEFAULT_PLACEHOLDER};
use crate::monitor::{Metrics, ProgressSink};
use crate::pipeline::PipelineRunner;
use stackflow_core::{Document, Path};
use stackflow_plan::{validate_required, Stack, RESOURCES_FIELD};
use stackflow_policy::{check_trait_fulfillment, Environment, Environments};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory `@file` directives are resolved against
    pub base_dir: PathBuf,
    /// Placeholder for generated strings
    pub placeholder: String,
    /// Whether unhandled traits fail validation
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            strict: true,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Set the string placeholder
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Enable or disable strict trait fulfillment
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Builds stacks for environments
#[derive(Debug, Clone)]
pub struct StackEngine {
    config: EngineConfig,
    materializer: Materializer,
}

impl StackEngine {
    /// Create an engine
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let materializer =
            Materializer::new(config.base_dir.clone()).with_placeholder(config.placeholder.clone());
        Self {
            config,
            materializer,
        }
    }

    /// Replace the materializer, e.g. to inject variables
    #[must_use]
    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = materializer;
        self
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check required fields and, in strict mode, trait fulfillment
    ///
    /// # Errors
    ///
    /// Returns the aggregated required-field or fulfillment error
    pub fn validate<D: Document>(
        &self,
        stack: &Stack<D>,
        environments: &Environments<D>,
    ) -> Result<(), BuildError> {
        validate_required(stack)?;
        if self.config.strict {
            check_trait_fulfillment(environments, stack)?;
        }
        info!(strict = self.config.strict, "Project is valid");
        Ok(())
    }

    /// Transform `stack` with the flows of `environment`
    ///
    /// # Errors
    ///
    /// Returns the first graph, match, fill, generated-field or driver-label
    /// error, the aggregated concreteness error, or `BuildError::Cancelled`
    pub fn transform_stack<D: Document>(
        &self,
        stack: &mut Stack<D>,
        environment: &Environment<D>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<Metrics, BuildError> {
        let result = self.run(stack, environment, cancel, progress);
        progress.finish();
        result
    }

    fn run<D: Document>(
        &self,
        stack: &mut Stack<D>,
        environment: &Environment<D>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<Metrics, BuildError> {
        if let Some(extra) = environment.additional_components() {
            stack.add_components(extra)?;
            debug!(environment = %environment.name(), "Merged additional components");
        }

        let tasks = stack.tasks().to_vec();
        let flows = environment.flows();
        progress.start((tasks.len() * flows.len()) as u64);
        info!(
            environment = %environment.name(),
            components = tasks.len(),
            flows = flows.len(),
            "Transforming stack"
        );

        let runner = PipelineRunner::new(&self.materializer, cancel.clone());
        let mut metrics = Metrics::new();

        for id in &tasks {
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let mut component = stack.get_component(id)?;

            for (index, flow) in flows.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(BuildError::Cancelled);
                }
                let label = flow
                    .name()
                    .map_or_else(|| index.to_string(), ToString::to_string);
                let run = runner.run(flow, stack, id, component)?;
                let matched = run.matched;
                component = run.component;
                if matched {
                    metrics.record_applied(flow.pipeline().len());
                    debug!(component = %id, flow = %label, "Applied flow");

                    if let Some(resource) = Stack::resources_without_driver(&component).into_iter().next() {
                        return Err(BuildError::ResourceDriver {
                            component: id.clone(),
                            resource,
                        });
                    }
                } else {
                    metrics.record_skip();
                }
                progress.flow_done(id, &label, matched);
            }

            stack.update_component(id, &component)?;
            let resources = component
                .lookup(&Path::root().field(RESOURCES_FIELD))
                .map_or(0, |r| r.fields().len());
            metrics.record_component(resources);
            progress.component_done(id);
            info!(component = %id, resources, "Component transformed");
        }

        let mut incomplete = Vec::new();
        for id in &tasks {
            let stored = stack.get_component(id)?;
            if !stored.is_concrete() {
                incomplete.push(IncompleteComponent {
                    id: id.clone(),
                    fields: stored.incomplete(),
                });
            }
        }
        if !incomplete.is_empty() {
            return Err(BuildError::Concreteness {
                components: incomplete,
            });
        }

        info!(
            environment = %environment.name(),
            flows_applied = metrics.flows_applied,
            resources = metrics.resources_emitted,
            "Stack transformed"
        );
        Ok(metrics)
    }
}

impl Default for StackEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
