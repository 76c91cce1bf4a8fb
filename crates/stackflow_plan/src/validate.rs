//! Required-field validation.
//!
//! A field marked `@required` must be set by the author, either with
//! concrete data or with a reference that a later step or component will
//! resolve. All violations are collected before reporting.

use crate::stack::Stack;
use stackflow_core::{Document, Path};

/// One unset required field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// Absolute path of the field
    pub path: Path,
}

/// Every required field left unset
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid components:{}", render(.missing))]
pub struct RequiredFieldError {
    /// The unset fields, in document order
    pub missing: Vec<MissingField>,
}

fn render(missing: &[MissingField]) -> String {
    missing
        .iter()
        .map(|m| format!("\n{} is a required field", m.path))
        .collect()
}

/// Check every `@required` field in the components section
///
/// # Errors
///
/// Returns all required fields that are neither concrete nor references
pub fn validate_required<D: Document>(stack: &Stack<D>) -> Result<(), RequiredFieldError> {
    let missing: Vec<_> = stack
        .root()
        .directive_fields()
        .into_iter()
        .filter(|f| f.path.starts_with(stack.components_path()))
        .filter(|f| f.is_required() && !f.concrete && !f.reference)
        .map(|f| MissingField { path: f.path })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RequiredFieldError { missing })
    }
}
