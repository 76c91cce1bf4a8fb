//! Core error types for STACKFLOW.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Expression or path could not be parsed
    ParseError {
        /// Offending source text
        input: String,
        /// What went wrong
        message: String,
    },

    /// A fill tried to replace concrete data with conflicting data
    FillConflict {
        /// Path where the conflict happened
        path: String,
        /// Value already present
        existing: String,
        /// Value being filled in
        incoming: String,
    },

    /// Validation error
    Validation { field: String, reason: String },

    /// Not found
    NotFound { kind: String, id: String },
}

impl CoreError {
    /// Shorthand for a parse error on `input`
    #[must_use]
    pub fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a fill conflict
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::FillConflict { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError { input, message } => {
                write!(f, "Parse error in `{}`: {}", input, message)
            }
            Self::FillConflict {
                path,
                existing,
                incoming,
            } => write!(
                f,
                "Conflicting values at {}: {} != {}",
                if path.is_empty() { "<root>" } else { path },
                existing,
                incoming
            ),
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
            Self::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
        }
    }
}

impl std::error::Error for CoreError {}
