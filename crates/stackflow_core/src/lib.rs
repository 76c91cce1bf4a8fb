//! STACKFLOW Core Types
//!
//! This crate holds the document model the engine works against: the
//! [`Document`] contract, the shipped [`Tree`] implementation, paths,
//! identifiers and the shared error type. It performs no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod eval;
pub mod expr;
pub mod id;
pub mod leaves;
pub mod path;
pub mod tree;
pub mod unify;
pub mod value;

// Re-exports
pub use document::{DirectiveField, Document, ExprReference, Incomplete};
pub use error::{CoreError, CoreResult};
pub use id::{ComponentId, EnvironmentName};
pub use leaves::{diff_leaves, Leaf, LeafChange, DiffSummary};
pub use path::{Path, Segment};
pub use tree::Tree;
pub use value::{Directive, Kind, Value};
