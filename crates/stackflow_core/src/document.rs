//! The document model contract.
//!
//! The engine never looks inside values itself. Everything it needs from a
//! partial-value store is expressed by the [`Document`] trait, so the store
//! can be swapped for another implementation. [`crate::Tree`] is the shipped one.

use crate::error::CoreResult;
use crate::leaves::Leaf;
use crate::path::Path;
use crate::value::{Directive, Kind};
use std::fmt;

/// A non-concrete value found inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incomplete {
    /// Where the value sits
    pub path: Path,
    /// What is missing
    pub reason: String,
}

impl fmt::Display for Incomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// A reference expression found inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprReference {
    /// Path of the value holding the expression
    pub at: Path,
    /// The reference as written
    pub expr: Path,
    /// Absolute path it resolves to, if any
    pub target: Option<Path>,
}

/// A field that carries directives
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveField {
    /// Absolute path of the field
    pub path: Path,
    /// Attached directives
    pub directives: Vec<Directive>,
    /// Kind constraint when the field is an incomplete scalar
    pub kind: Option<Kind>,
    /// Whether the field already holds concrete data
    pub concrete: bool,
    /// Whether the field is written as a reference
    pub reference: bool,
}

impl DirectiveField {
    /// Whether any directive asks for a generated value
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.directives.iter().any(Directive::is_generating)
    }

    /// Whether the field is marked `@required`
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.directives.contains(&Directive::Required)
    }
}

/// A partial, path-addressable value tree
///
/// All operations are pure: `fill` returns a new document and leaves the
/// receiver untouched. Views (`lookup`, `fields`, `is_concrete`, ...) see the
/// document with references and embeds evaluated.
pub trait Document: Clone + fmt::Debug + Send + Sync + Sized {
    /// An empty struct document
    fn empty() -> Self;

    /// Parse a JSON (or YAML-decoded) document
    ///
    /// # Errors
    ///
    /// Returns error if an expression inside the document is malformed
    fn from_json(json: &serde_json::Value) -> CoreResult<Self>;

    /// Render the evaluated document, incomplete values as expressions
    fn to_json(&self) -> serde_json::Value;

    /// The evaluated document as plain data, strings unescaped
    ///
    /// This is the form handed to drivers; it does not parse back.
    fn export(&self) -> serde_json::Value;

    /// Fully evaluate references and embeds
    ///
    /// # Errors
    ///
    /// Returns a fill conflict if an embedded value disagrees with the
    /// struct it is embedded in
    fn evaluate(&self) -> CoreResult<Self>;

    /// Evaluated sub-document at `path`
    ///
    /// # Errors
    ///
    /// Returns a fill conflict if an embed on the way disagrees with its
    /// struct
    fn try_lookup(&self, path: &Path) -> CoreResult<Option<Self>>;

    /// Evaluated sub-document at `path`; a conflicting value reads as absent
    fn lookup(&self, path: &Path) -> Option<Self> {
        self.try_lookup(path).ok().flatten()
    }

    /// Sub-document at `path` as written
    ///
    /// References that stay inside the sub-document are kept, so it can be
    /// used as a template. References leaving it are replaced by their
    /// evaluated targets.
    fn detach(&self, path: &Path) -> Option<Self>;

    /// Merge `value` into the document at `path`
    ///
    /// Missing fields along the path are created.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::FillConflict` if concrete data disagrees
    fn fill(&self, path: &Path, value: &Self) -> CoreResult<Self>;

    /// Struct fields in insertion order; empty for non-structs
    fn fields(&self) -> Vec<(String, Self)>;

    /// List elements; empty for non-lists
    fn elements(&self) -> Vec<Self>;

    /// The string value, if this is a concrete string
    fn as_string(&self) -> Option<String>;

    /// Whether every reachable leaf holds a single determined value
    ///
    /// A document whose embeds conflict is never concrete.
    fn is_concrete(&self) -> bool;

    /// Every non-concrete sub-value, with its path
    fn incomplete(&self) -> Vec<Incomplete>;

    /// Whether this pattern admits `value` with final semantics
    ///
    /// Incomplete parts of `value` never satisfy the pattern.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern itself contains an unresolved reference
    fn admits(&self, value: &Self) -> CoreResult<bool>;

    /// Structural equality of the evaluated documents
    fn equals(&self, other: &Self) -> bool;

    /// Every field carrying directives, in document order
    fn directive_fields(&self) -> Vec<DirectiveField>;

    /// Every reference expression written under `path`
    fn references(&self, path: &Path) -> Vec<ExprReference>;

    /// Flattened leaves in lexicographic path order
    fn leaves(&self) -> Vec<Leaf>;

    /// Whether a field exists at `path`
    fn contains(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    /// String elements of a list, skipping non-strings
    fn string_list(&self) -> Vec<String> {
        self.elements()
            .iter()
            .filter_map(Document::as_string)
            .collect()
    }
}
