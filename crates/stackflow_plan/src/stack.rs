//! The component stack.
//!
//! A stack owns the raw project document and knows where its components
//! section lives. Components are read through evaluated lookups and
//! written back by merging, so references between components stay live
//! until both sides are concrete.

use crate::graph::{DependencyGraph, GraphError};
use indexmap::IndexMap;
use stackflow_core::{ComponentId, CoreError, CoreResult, Document, Path, Tree};
use tracing::{debug, info};

/// Default location of the components section
pub const DEFAULT_COMPONENTS_PATH: &str = "components";

/// Reserved field holding emitted resources
pub const RESOURCES_FIELD: &str = "$resources";

/// Components plus their dependency graph and schedule
#[derive(Debug, Clone)]
pub struct Stack<D: Document = Tree> {
    root: D,
    components_path: Path,
    graph: DependencyGraph,
}

impl<D: Document> Stack<D> {
    /// Build a stack from a root document holding a `components` section
    ///
    /// # Errors
    ///
    /// Returns error if the dependency graph cannot be built
    pub fn new(root: D) -> Result<Self, GraphError> {
        Self::with_components_path(root, Path::root().field(DEFAULT_COMPONENTS_PATH))
    }

    /// Build a stack whose components live at `components_path`
    ///
    /// # Errors
    ///
    /// Returns error if the dependency graph cannot be built
    pub fn with_components_path(root: D, components_path: Path) -> Result<Self, GraphError> {
        let graph = DependencyGraph::build(&root, &components_path)?;
        info!(
            components = graph.dependencies().len(),
            tasks = ?graph.tasks(),
            "Built component graph"
        );
        Ok(Self {
            root,
            components_path,
            graph,
        })
    }

    /// Dependencies of a task
    ///
    /// # Errors
    ///
    /// Returns error if `id` is not a task
    pub fn get_dependencies(&self, id: &ComponentId) -> CoreResult<&[ComponentId]> {
        self.graph
            .dependencies_of(id)
            .ok_or_else(|| CoreError::NotFound {
                kind: "Task".to_string(),
                id: id.to_string(),
            })
    }

    /// Evaluated component
    ///
    /// # Errors
    ///
    /// Returns error if no component has this key, or a fill conflict if
    /// the component's embeds disagree with it
    pub fn get_component(&self, id: &ComponentId) -> CoreResult<D> {
        self.root
            .try_lookup(&self.component_path(id))?
            .ok_or_else(|| CoreError::NotFound {
                kind: "Component".to_string(),
                id: id.to_string(),
            })
    }

    /// Merge a transformed component back into the stack
    ///
    /// # Errors
    ///
    /// Returns a fill conflict if the new value contradicts the stored one
    pub fn update_component(&mut self, id: &ComponentId, value: &D) -> CoreResult<()> {
        self.root = self.root.fill(&self.component_path(id), value)?;
        debug!(component = %id, "Updated component");
        Ok(())
    }

    /// Merge extra components into the section and rebuild the graph
    ///
    /// # Errors
    ///
    /// Returns error if the merge conflicts or the new graph is invalid
    pub fn add_components(&mut self, components: &D) -> Result<(), GraphError> {
        let root = self.root.fill(&self.components_path, components)?;
        let graph = DependencyGraph::build(&root, &self.components_path)?;
        info!(tasks = ?graph.tasks(), "Recomputed component graph");
        self.root = root;
        self.graph = graph;
        Ok(())
    }

    /// Tasks in schedule order
    #[must_use]
    pub fn tasks(&self) -> &[ComponentId] {
        self.graph.tasks()
    }

    /// The dependency graph
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// All tasks with their dependencies
    #[must_use]
    pub fn dependencies(&self) -> &IndexMap<ComponentId, Vec<ComponentId>> {
        self.graph.dependencies()
    }

    /// Keys of every component, task or not, in declaration order
    #[must_use]
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components()
            .map(|section| {
                section
                    .fields()
                    .into_iter()
                    .map(|(key, _)| ComponentId::new(key))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evaluated components section
    #[must_use]
    pub fn components(&self) -> Option<D> {
        self.root.lookup(&self.components_path)
    }

    /// The raw root document
    #[must_use]
    pub fn root(&self) -> &D {
        &self.root
    }

    /// Where the components section lives
    #[must_use]
    pub fn components_path(&self) -> &Path {
        &self.components_path
    }

    /// Absolute path of a component
    #[must_use]
    pub fn component_path(&self, id: &ComponentId) -> Path {
        self.components_path.field(id.as_str())
    }

    /// Whether a component is fully concrete
    #[must_use]
    pub fn is_concrete_component(component: &D) -> bool {
        component.is_concrete()
    }

    /// Names of `$resources` entries without a concrete driver label
    #[must_use]
    pub fn resources_without_driver(component: &D) -> Vec<String> {
        let Some(resources) = component.lookup(&Path::root().field(RESOURCES_FIELD)) else {
            return Vec::new();
        };
        let driver = driver_label_path();
        resources
            .fields()
            .into_iter()
            .filter(|(_, resource)| {
                !resource
                    .lookup(&driver)
                    .is_some_and(|label| label.is_concrete())
            })
            .map(|(name, _)| name)
            .collect()
    }

    /// Whether every `$resources` entry carries a concrete driver label
    #[must_use]
    pub fn has_concrete_resource_drivers(component: &D) -> bool {
        Self::resources_without_driver(component).is_empty()
    }
}

/// `$metadata.labels.driver`
#[must_use]
pub fn driver_label_path() -> Path {
    Path::root()
        .field("$metadata")
        .field("labels")
        .field("driver")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack(json: serde_json::Value) -> Stack {
        Stack::new(Tree::from_json(&json).unwrap()).unwrap()
    }

    fn tree(json: serde_json::Value) -> Tree {
        Tree::from_json(&json).unwrap()
    }

    #[test]
    fn test_get_component_evaluates_references() {
        let stack = stack(json!({"components": {
            "a": {"$metadata": {"id": "a"}, "todo": "${b.todo}"},
            "b": {"$metadata": {"id": "b"}, "todo": 123},
        }}));
        let a = stack.get_component(&"a".into()).unwrap();
        assert!(Stack::is_concrete_component(&a));
        assert_eq!(a.lookup(&Path::parse("todo").unwrap()).unwrap().to_json(), json!(123));
        assert!(stack.get_component(&"z".into()).is_err());
    }

    #[test]
    fn test_embed_conflict_is_reported() {
        let root = tree(json!({"components": {
            "a": {"$metadata": {"id": "a"}, "size": 1, "<<": {"size": 2}},
        }}));
        match Stack::new(root).unwrap_err() {
            GraphError::Document(err) => {
                assert!(err.is_conflict());
                assert!(err.to_string().contains("components.a"));
            }
            other => panic!("expected fill conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_get_dependencies_unknown_task() {
        let stack = stack(json!({"components": {"a": {"$metadata": {"id": "a"}}}}));
        assert!(stack.get_dependencies(&"a".into()).unwrap().is_empty());
        let err = stack.get_dependencies(&"nope".into()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_update_component_propagates_through_references() {
        let mut stack = stack(json!({"components": {
            "a": {"$metadata": {"id": "a"}, "host": "${b.host}"},
            "b": {"$metadata": {"id": "b"}, "host": "${string}"},
        }}));
        assert!(!stack.get_component(&"a".into()).unwrap().is_concrete());

        let b = stack
            .get_component(&"b".into())
            .unwrap()
            .fill(&Path::parse("host").unwrap(), &tree(json!("db.local")))
            .unwrap();
        stack.update_component(&"b".into(), &b).unwrap();

        let a = stack.get_component(&"a".into()).unwrap();
        assert!(a.is_concrete());
        assert_eq!(a.to_json()["host"], json!("db.local"));
    }

    #[test]
    fn test_update_component_conflict() {
        let mut stack = stack(json!({"components": {"a": {"$metadata": {"id": "a"}, "x": 1}}}));
        let err = stack
            .update_component(&"a".into(), &tree(json!({"x": 2})))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_add_components_recomputes_graph() {
        let mut stack = stack(json!({"components": {
            "b": {"$metadata": {"id": "b"}, "todo": 1},
        }}));
        assert_eq!(stack.tasks().len(), 1);
        stack
            .add_components(&tree(json!({
                "a": {"$metadata": {"id": "a"}, "todo": "${b.todo}"},
            })))
            .unwrap();
        let order: Vec<_> = stack.tasks().iter().map(ComponentId::as_str).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(stack.get_dependencies(&"a".into()).unwrap(), &[ComponentId::new("b")]);
    }

    #[test]
    fn test_custom_components_path() {
        let root = tree(json!({"stack": {"components": {"a": {"$metadata": {"id": "a"}}}}}));
        let stack = Stack::with_components_path(root, Path::parse("stack.components").unwrap()).unwrap();
        assert_eq!(stack.component_ids(), vec![ComponentId::new("a")]);
    }

    #[test]
    fn test_resource_drivers() {
        let good = tree(json!({"$resources": {
            "svc": {"$metadata": {"labels": {"driver": "compose"}}, "image": "x"},
        }}));
        assert!(Stack::has_concrete_resource_drivers(&good));

        let bad = tree(json!({"$resources": {
            "svc": {"$metadata": {"labels": {"driver": "${string}"}}},
            "other": {"image": "y"},
        }}));
        assert_eq!(Stack::resources_without_driver(&bad), vec!["svc", "other"]);

        assert!(Stack::has_concrete_resource_drivers(&tree(json!({"x": 1}))));
    }
}
