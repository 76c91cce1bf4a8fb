//! STACKFLOW Planner
//!
//! Builds the dependency graph between stack components, computes the
//! deterministic processing schedule and owns the component store the
//! engine reads from and writes back to.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod stack;
pub mod validate;

pub use graph::{DependencyGraph, GraphError};
pub use stack::{driver_label_path, Stack, DEFAULT_COMPONENTS_PATH, RESOURCES_FIELD};
pub use validate::{validate_required, MissingField, RequiredFieldError};
