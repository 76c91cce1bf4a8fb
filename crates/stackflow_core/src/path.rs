//! Paths addressing values inside a document.
//!
//! A path is a sequence of field selectors and list indices, written
//! `components.web.ports[0].port`. Field names may start with `$`
//! (`$metadata`, `$resources`).

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Struct field selector
    Field(String),
    /// List index
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A path from a document root to a value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The empty path, addressing the root
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments
    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Parse a dotted path such as `$metadata.labels.driver` or `ports[0]`
    ///
    /// # Errors
    ///
    /// Returns error if a selector is empty or an index is not a number
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for part in s.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if name.is_empty() && (segments.is_empty() || rest.is_empty()) {
                return Err(CoreError::parse(s, "empty selector"));
            }
            if !name.is_empty() {
                segments.push(Segment::Field(name.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| CoreError::parse(s, "unclosed index"))?;
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| CoreError::parse(s, "list index must be a number"))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(CoreError::parse(s, "unexpected text after index"));
                }
            }
        }
        Ok(Self(segments))
    }

    /// Append a field selector
    #[must_use]
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Field(name.into()));
        Self(segments)
    }

    /// Append a list index
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    /// Concatenate two paths
    #[must_use]
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// First `len` segments of this path
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// Path without its last segment, `None` at the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.prefix(self.0.len() - 1))
        }
    }

    /// Path of the innermost struct that lexically encloses the value here
    ///
    /// Trailing list indices are skipped, then the field selector is dropped.
    #[must_use]
    pub fn enclosing_struct(&self) -> Self {
        let mut segments = self.0.clone();
        while matches!(segments.last(), Some(Segment::Index(_))) {
            segments.pop();
        }
        segments.pop();
        Self(segments)
    }

    /// All segments
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// First segment, if any
    #[must_use]
    pub fn first(&self) -> Option<&Segment> {
        self.0.first()
    }

    /// Name of the first segment when it is a field selector
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        match self.0.first() {
            Some(Segment::Field(name)) => Some(name),
            _ => None,
        }
    }

    /// Last segment, if any
    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Number of segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `other` is a prefix of this path
    #[must_use]
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Whether any segment is a field starting with `$`
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0
            .iter()
            .any(|s| matches!(s, Segment::Field(name) if name.starts_with('$')))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) if i > 0 => write!(f, ".{}", name)?,
                other => write!(f, "{}", other)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted() {
        let path = Path::parse("$metadata.labels.driver").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.head(), Some("$metadata"));
        assert_eq!(path.to_string(), "$metadata.labels.driver");
    }

    #[test]
    fn test_parse_indices() {
        let path = Path::parse("service.ports[0][2].name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Field("service".to_string()),
                Segment::Field("ports".to_string()),
                Segment::Index(0),
                Segment::Index(2),
                Segment::Field("name".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "service.ports[0][2].name");
    }

    #[test]
    fn test_parse_empty_is_root() {
        assert!(Path::parse("").unwrap().is_empty());
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Path::parse("a..b").is_err());
        assert!(Path::parse("a[x]").is_err());
        assert!(Path::parse("a[1").is_err());
        assert!(Path::parse("a[1]b").is_err());
    }

    #[test]
    fn test_enclosing_struct() {
        let path = Path::parse("web.ports[1]").unwrap();
        assert_eq!(path.enclosing_struct().to_string(), "web");
        let path = Path::parse("web.image").unwrap();
        assert_eq!(path.enclosing_struct().to_string(), "web");
        let path = Path::parse("web").unwrap();
        assert!(path.enclosing_struct().is_empty());
    }

    #[test]
    fn test_builders() {
        let path = Path::root().field("a").index(3).field("b");
        assert_eq!(path.to_string(), "a[3].b");
        assert_eq!(path.parent().unwrap().to_string(), "a[3]");
        assert!(path.starts_with(&Path::parse("a").unwrap()));
        assert!(!path.is_reserved());
        assert!(path.field("$resources").is_reserved());
    }
}
