//! Dependency graph over stack components.
//!
//! A component is a task node when it carries `$metadata.id`. Edges come
//! from reference expressions: task `a` depends on task `b` when something
//! inside `a` refers to a path rooted in `b`. The schedule is a
//! deterministic topological order with a lexicographic tie-break.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use stackflow_core::{ComponentId, CoreError, Document, Path, Segment};
use std::collections::HashMap;
use tracing::debug;

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A reference inside a component does not resolve
    #[error("Missing reference in component {component}: `{reference}` at {at} does not resolve")]
    MissingReference {
        /// Component holding the reference
        component: ComponentId,
        /// The reference as written
        reference: String,
        /// Where the reference sits
        at: String,
    },

    /// Components depend on each other in a loop
    #[error("Dependency cycle detected: {}", join_ids(.path))]
    Cycle {
        /// The cycle, first node repeated at the end
        path: Vec<ComponentId>,
    },

    /// `$metadata.id` disagrees with the component key
    #[error("Component {key} declares a different $metadata.id: {declared}")]
    IdentityMismatch {
        /// Key in the components section
        key: ComponentId,
        /// Declared identity
        declared: String,
    },

    /// The underlying document failed
    #[error(transparent)]
    Document(#[from] CoreError),
}

fn join_ids(ids: &[ComponentId]) -> String {
    ids.iter()
        .map(ComponentId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Task dependencies plus the computed schedule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Dependencies per task, tasks in declaration order
    dependencies: IndexMap<ComponentId, Vec<ComponentId>>,
    /// Topological order
    tasks: Vec<ComponentId>,
}

impl DependencyGraph {
    /// Build the graph for the components section at `components`
    ///
    /// # Errors
    ///
    /// Returns error if the section is missing or conflicts, an identity
    /// disagrees with its key, a reference does not resolve, or the
    /// dependencies loop
    pub fn build<D: Document>(root: &D, components: &Path) -> Result<Self, GraphError> {
        let section = root.try_lookup(components)?.ok_or_else(|| CoreError::NotFound {
            kind: "Components section".to_string(),
            id: components.to_string(),
        })?;

        let mut task_ids = IndexSet::new();
        for (key, component) in section.fields() {
            let id_path = Path::root().field("$metadata").field("id");
            let Some(declared) = component.lookup(&id_path) else {
                continue;
            };
            if declared.is_concrete() && declared.as_string().as_deref() != Some(key.as_str()) {
                return Err(GraphError::IdentityMismatch {
                    key: ComponentId::new(key),
                    declared: declared.to_json().to_string(),
                });
            }
            task_ids.insert(ComponentId::new(key));
        }

        let mut dependencies = IndexMap::new();
        for id in &task_ids {
            let deps = discover(root, components, id, &task_ids)?;
            debug!(component = %id, dependencies = ?deps, "Discovered dependencies");
            dependencies.insert(id.clone(), deps);
        }

        let mut graph = Self {
            dependencies,
            tasks: Vec::new(),
        };
        graph.check_cycles()?;
        graph.tasks = graph.compute_order();
        Ok(graph)
    }

    /// Dependencies of a task, in discovery order
    #[must_use]
    pub fn dependencies_of(&self, id: &ComponentId) -> Option<&[ComponentId]> {
        self.dependencies.get(id).map(Vec::as_slice)
    }

    /// All tasks with their dependencies
    #[must_use]
    pub fn dependencies(&self) -> &IndexMap<ComponentId, Vec<ComponentId>> {
        &self.dependencies
    }

    /// Tasks in schedule order
    #[must_use]
    pub fn tasks(&self) -> &[ComponentId] {
        &self.tasks
    }

    /// Whether `id` is a task node
    #[must_use]
    pub fn is_task(&self, id: &ComponentId) -> bool {
        self.dependencies.contains_key(id)
    }

    /// Iterative colour-marking DFS
    fn check_cycles(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Colour {
            White,
            Grey,
            Black,
        }

        let mut colour: HashMap<&ComponentId, Colour> =
            self.dependencies.keys().map(|id| (id, Colour::White)).collect();
        let mut roots: Vec<&ComponentId> = self.dependencies.keys().collect();
        roots.sort();

        for root in roots {
            if colour[root] != Colour::White {
                continue;
            }
            // (node, index of the next dependency to visit)
            let mut stack: Vec<(&ComponentId, usize)> = vec![(root, 0)];
            colour.insert(root, Colour::Grey);

            while let Some((node, next)) = stack.last_mut() {
                let deps = &self.dependencies[*node];
                if *next >= deps.len() {
                    colour.insert(*node, Colour::Black);
                    stack.pop();
                    continue;
                }
                let dep = &deps[*next];
                *next += 1;
                match colour.get(dep).copied() {
                    Some(Colour::White) => {
                        colour.insert(dep, Colour::Grey);
                        stack.push((dep, 0));
                    }
                    Some(Colour::Grey) => {
                        let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let mut path: Vec<ComponentId> =
                            stack[start..].iter().map(|(n, _)| (*n).clone()).collect();
                        path.push(dep.clone());
                        return Err(GraphError::Cycle { path });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Stack-based ordering: sorted IDs pushed once, dependencies pushed on demand
    fn compute_order(&self) -> Vec<ComponentId> {
        let mut visited: HashMap<&ComponentId, bool> =
            self.dependencies.keys().map(|id| (id, false)).collect();
        let mut stack: Vec<&ComponentId> = self.dependencies.keys().collect();
        stack.sort();

        let mut result = Vec::with_capacity(stack.len());
        while let Some(&current) = stack.last() {
            if visited[current] {
                stack.pop();
                continue;
            }

            let mut ready = true;
            for dep in &self.dependencies[current] {
                if !visited[dep] {
                    ready = false;
                    stack.push(dep);
                }
            }
            if !ready {
                continue;
            }

            visited.insert(current, true);
            result.push(current.clone());
            stack.pop();
        }
        result
    }
}

/// Other task components referenced from inside `id`
fn discover<D: Document>(
    root: &D,
    components: &Path,
    id: &ComponentId,
    tasks: &IndexSet<ComponentId>,
) -> Result<Vec<ComponentId>, GraphError> {
    let mut deps: IndexSet<ComponentId> = IndexSet::new();
    for reference in root.references(&components.field(id.as_str())) {
        let Some(target) = reference.target else {
            return Err(GraphError::MissingReference {
                component: id.clone(),
                reference: reference.expr.to_string(),
                at: reference.at.to_string(),
            });
        };
        if !target.starts_with(components) {
            continue;
        }
        let Some(Segment::Field(name)) = target.segments().get(components.len()) else {
            continue;
        };
        let dep = ComponentId::new(name.as_str());
        if &dep != id && tasks.contains(&dep) {
            deps.insert(dep);
        }
    }
    Ok(deps.into_iter().collect())
}
