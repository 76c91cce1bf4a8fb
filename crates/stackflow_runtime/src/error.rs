//! Build errors.

use crate::generate::GeneratedFieldError;
use stackflow_core::{ComponentId, CoreError, Incomplete};
use stackflow_plan::{GraphError, RequiredFieldError};
use stackflow_policy::{EnvironmentError, FulfillmentError, MatchError};

/// Non-concrete leftovers of one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteComponent {
    /// Component key
    pub id: ComponentId,
    /// Every non-concrete value, path relative to the component
    pub fields: Vec<Incomplete>,
}

/// Any failure while building a stack for an environment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Dependency graph could not be built
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A flow is malformed
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Merging values failed, typically a fill conflict
    #[error(transparent)]
    Document(#[from] CoreError),

    /// A generated field could not be materialized
    #[error(transparent)]
    Generated(#[from] GeneratedFieldError),

    /// Environment definitions are malformed or missing
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Required fields are unset
    #[error(transparent)]
    Required(#[from] RequiredFieldError),

    /// Strict mode found unhandled traits
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    /// A resource has no concrete driver label
    #[error("Component {component}: resource {resource} has no concrete $metadata.labels.driver")]
    ResourceDriver {
        /// Component emitting the resource
        component: ComponentId,
        /// Resource key under `$resources`
        resource: String,
    },

    /// Components left incomplete after all flows ran
    #[error("Stack is not concrete:{}", render(.components))]
    Concreteness {
        /// Every incomplete component
        components: Vec<IncompleteComponent>,
    },

    /// The build was cancelled
    #[error("Build cancelled")]
    Cancelled,
}

fn render(components: &[IncompleteComponent]) -> String {
    let mut out = String::new();
    for component in components {
        out.push_str(&format!("\ncomponent {}:", component.id));
        for field in &component.fields {
            out.push_str(&format!("\n  {}", field));
        }
    }
    out
}
