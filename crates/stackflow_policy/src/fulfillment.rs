//! Trait fulfillment checks.
//!
//! In strict mode every trait a component declares must be handled in every
//! environment: some flow matching the component has a pipeline step that
//! declares the trait.

use crate::environment::Environments;
use crate::flow::trait_names;
use crate::matcher::MatchError;
use indexmap::IndexMap;
use stackflow_core::{ComponentId, Document, EnvironmentName, Path};
use stackflow_plan::Stack;
use tracing::debug;

/// `component -> trait -> environment -> handled`
pub type FulfillmentMatrix = IndexMap<ComponentId, IndexMap<String, IndexMap<EnvironmentName, bool>>>;

/// A trait left unhandled in one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetObligation {
    /// Component declaring the trait
    pub component: ComponentId,
    /// Trait name
    pub trait_name: String,
    /// Environment without a handling flow
    pub environment: EnvironmentName,
}

/// Errors raised by the fulfillment check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FulfillmentError {
    /// At least one trait is not handled somewhere
    #[error("Traits not fulfilled by any flow:{}", render(.unmet))]
    Unfulfilled {
        /// Every unmet obligation
        unmet: Vec<UnmetObligation>,
    },

    /// A flow could not be evaluated
    #[error(transparent)]
    Match(#[from] MatchError),
}

fn render(unmet: &[UnmetObligation]) -> String {
    unmet
        .iter()
        .map(|u| {
            format!(
                "\ncomponent {}: trait {} is not handled in environment {}",
                u.component, u.trait_name, u.environment
            )
        })
        .collect()
}

/// Build the full fulfillment matrix
///
/// # Errors
///
/// Returns error if a flow's `match` pattern is malformed
pub fn fulfillment_matrix<D: Document>(
    environments: &Environments<D>,
    stack: &Stack<D>,
) -> Result<FulfillmentMatrix, MatchError> {
    let traits_path = Path::root().field("$metadata").field("traits");
    let mut matrix = FulfillmentMatrix::new();

    for id in stack.component_ids() {
        let Ok(component) = stack.get_component(&id) else {
            continue;
        };
        let traits = component
            .lookup(&traits_path)
            .map(|t| trait_names(&t))
            .unwrap_or_default();

        let mut per_trait = IndexMap::new();
        for trait_name in traits {
            let mut per_env = IndexMap::new();
            for env in environments.iter() {
                let mut handled = false;
                for flow in env.flows() {
                    if flow.handles(&trait_name) && flow.matches(&component)? {
                        handled = true;
                        break;
                    }
                }
                per_env.insert(env.name().clone(), handled);
            }
            per_trait.insert(trait_name, per_env);
        }
        matrix.insert(id, per_trait);
    }
    Ok(matrix)
}

/// Require every declared trait to be handled in every environment
///
/// # Errors
///
/// Returns `FulfillmentError::Unfulfilled` listing every unmet obligation
pub fn check_trait_fulfillment<D: Document>(
    environments: &Environments<D>,
    stack: &Stack<D>,
) -> Result<FulfillmentMatrix, FulfillmentError> {
    let matrix = fulfillment_matrix(environments, stack)?;

    let unmet: Vec<_> = matrix
        .iter()
        .flat_map(|(component, traits)| {
            traits.iter().flat_map(move |(trait_name, envs)| {
                envs.iter()
                    .filter(|(_, handled)| !**handled)
                    .map(move |(environment, _)| UnmetObligation {
                        component: component.clone(),
                        trait_name: trait_name.clone(),
                        environment: environment.clone(),
                    })
            })
        })
        .collect();

    debug!(
        components = matrix.len(),
        unmet = unmet.len(),
        "Checked trait fulfillment"
    );
    if unmet.is_empty() {
        Ok(matrix)
    } else {
        Err(FulfillmentError::Unfulfilled { unmet })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DEFAULT_BUILDERS_PATH;
    use serde_json::json;
    use stackflow_core::Tree;

    fn load(json: serde_json::Value) -> (Environments, Stack) {
        let root = Tree::from_json(&json).unwrap();
        let envs = Environments::parse(&root, &Path::root().field(DEFAULT_BUILDERS_PATH)).unwrap();
        let stack = Stack::new(root).unwrap();
        (envs, stack)
    }

    fn workload_flow() -> serde_json::Value {
        json!({
            "match": {"traits": {"workload": null}},
            "pipeline": [{"$metadata": {"traits": {"workload": null}}, "input": "${_}", "output": "${input}"}],
        })
    }

    fn expose_flow() -> serde_json::Value {
        json!({
            "match": {"traits": {"exposable": null}},
            "pipeline": [{"$metadata": {"traits": {"exposable": null}}, "input": "${_}", "output": "${input}"}],
        })
    }

    #[test]
    fn test_exposable_missing_in_prod() {
        let (envs, stack) = load(json!({
            "components": {"web": {"$metadata": {
                "id": "web",
                "traits": {"workload": null, "exposable": null},
            }}},
            "environments": {
                "dev": {"flows": [workload_flow(), expose_flow()]},
                "prod": {"flows": [workload_flow()]},
            },
        }));

        let matrix = fulfillment_matrix(&envs, &stack).unwrap();
        let web = &matrix[&ComponentId::new("web")];
        assert_eq!(web["workload"]["dev"], true);
        assert_eq!(web["workload"]["prod"], true);
        assert_eq!(web["exposable"]["dev"], true);
        assert_eq!(web["exposable"]["prod"], false);

        let err = check_trait_fulfillment(&envs, &stack).unwrap_err();
        match &err {
            FulfillmentError::Unfulfilled { unmet } => {
                assert_eq!(
                    unmet,
                    &vec![UnmetObligation {
                        component: ComponentId::new("web"),
                        trait_name: "exposable".to_string(),
                        environment: EnvironmentName::new("prod"),
                    }]
                );
            }
            other => panic!("expected unfulfilled, got {:?}", other),
        }
        assert!(err
            .to_string()
            .contains("component web: trait exposable is not handled in environment prod"));
    }

    #[test]
    fn test_all_traits_handled() {
        let (envs, stack) = load(json!({
            "components": {
                "web": {"$metadata": {"id": "web", "traits": {"workload": null}}},
                "plain": {"$metadata": {"id": "plain"}},
            },
            "environments": {"dev": {"flows": [workload_flow()]}},
        }));
        let matrix = check_trait_fulfillment(&envs, &stack).unwrap();
        assert!(matrix[&ComponentId::new("plain")].is_empty());
    }

    #[test]
    fn test_declaring_flow_must_also_match() {
        // the step declares the trait but the flow only matches workloads
        let (envs, stack) = load(json!({
            "components": {"web": {"$metadata": {"id": "web", "traits": {"exposable": null}}}},
            "environments": {"dev": {"flows": [{
                "match": {"traits": {"workload": null}},
                "pipeline": [{"$metadata": {"traits": {"exposable": null}}, "input": "${_}", "output": "${input}"}],
            }]}},
        }));
        assert!(check_trait_fulfillment(&envs, &stack).is_err());
    }
}
