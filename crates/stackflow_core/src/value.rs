//! Partial values held by the document shim.
//!
//! A value is either concrete data (null, bool, number, string, list,
//! struct) or incomplete: a kind constraint such as `string`, or an
//! unresolved reference. Fields inside structs carry directives.

use crate::path::Path;
use indexmap::IndexMap;
use serde_json::Number;
use std::fmt;
use std::path::PathBuf;

/// Kind constraint of an incomplete value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Any value (`_`)
    Top,
    /// Any string
    String,
    /// Any integer
    Int,
    /// Any number, integer or float
    Number,
    /// Any boolean
    Bool,
}

impl Kind {
    /// Parse a kind keyword
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "_" => Some(Self::Top),
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "number" => Some(Self::Number),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    /// Keyword used in expressions
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Top => "_",
            Self::String => "string",
            Self::Int => "int",
            Self::Number => "number",
            Self::Bool => "bool",
        }
    }

    /// Whether a concrete value belongs to this kind
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Top, _) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Number, Value::Number(_)) => true,
            (Self::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }

    /// Greatest lower bound of two kinds
    #[must_use]
    pub fn meet(self, other: Kind) -> Option<Kind> {
        match (self, other) {
            (Self::Top, k) | (k, Self::Top) => Some(k),
            (Self::Int, Self::Number) | (Self::Number, Self::Int) => Some(Self::Int),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }
}

/// Synthesis and validation directives attached to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Synthesize a value when the field is still unset
    Generate,
    /// Synthesize from the content of a file
    FromFile(PathBuf),
    /// Synthesize from an environment variable
    FromEnv(String),
    /// The field must be set by the author or through a reference
    Required,
}

impl Directive {
    /// Whether this directive asks for a generated value
    #[must_use]
    pub fn is_generating(&self) -> bool {
        !matches!(self, Self::Required)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "@generate"),
            Self::FromFile(path) => write!(f, "@file({})", path.display()),
            Self::FromEnv(name) => write!(f, "@env({})", name),
            Self::Required => write!(f, "@required"),
        }
    }
}

/// A reference expression such as `b.todo`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Path as written, resolved lexically from the referencing site
    pub path: Path,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// A struct field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field value
    pub value: Value,
    /// Directives attached to the field
    pub directives: Vec<Directive>,
}

impl Field {
    /// A field without directives
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            directives: Vec::new(),
        }
    }

    /// Attach directives
    #[must_use]
    pub fn with_directives(mut self, directives: Vec<Directive>) -> Self {
        self.directives = directives;
        self
    }
}

/// A struct: ordered fields plus embedded values awaiting evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Struct {
    /// Declared fields, in insertion order
    pub fields: IndexMap<String, Field>,
    /// Embedded values (`<<` keys), merged into the struct on evaluation
    pub embeds: Vec<Value>,
}

impl Struct {
    /// Create an empty struct
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a plain field
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), Field::new(value));
    }

    /// Get a field value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|f| &f.value)
    }
}

/// A partial value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(Number),
    /// String
    String(String),
    /// List
    List(Vec<Value>),
    /// Struct
    Struct(Struct),
    /// Incomplete value constrained to a kind
    Kind(Kind),
    /// Unresolved reference
    Ref(Reference),
}

impl Value {
    /// The top value `_`
    #[must_use]
    pub const fn top() -> Self {
        Self::Kind(Kind::Top)
    }

    /// Empty struct
    #[must_use]
    pub fn empty_struct() -> Self {
        Self::Struct(Struct::new())
    }

    /// Whether this is a scalar (null, bool, number or string)
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    /// Whether every reachable leaf holds a single determined value
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Kind(_) | Self::Ref(_) => false,
            Self::List(items) => items.iter().all(Value::is_concrete),
            Self::Struct(s) => s.embeds.is_empty() && s.fields.values().all(|f| f.value.is_concrete()),
            _ => true,
        }
    }

    /// Struct view, if this is a struct
    #[must_use]
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// String view, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Structural equality, ignoring directives
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (Self::Struct(a), Self::Struct(b)) => {
                a.fields.len() == b.fields.len()
                    && a.fields.iter().all(|(name, field)| {
                        b.fields
                            .get(name)
                            .is_some_and(|other| field.value.same(&other.value))
                    })
            }
            (a, b) => a == b,
        }
    }

    /// Child value at a path, without evaluation
    #[must_use]
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for segment in path.segments() {
            current = match (current, segment) {
                (Self::Struct(s), crate::path::Segment::Field(name)) => s.get(name)?,
                (Self::List(items), crate::path::Segment::Index(i)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Short human-readable rendering used in diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => format!("{:?}", s),
            Self::List(items) => format!("[...{} items]", items.len()),
            Self::Struct(_) => "{...}".to_string(),
            Self::Kind(kind) => kind.keyword().to_string(),
            Self::Ref(r) => format!("reference {}", r),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.describe()),
        }
    }
}
