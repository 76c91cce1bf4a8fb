//! Reference and embed evaluation over a raw value tree.
//!
//! References resolve lexically: starting from the innermost struct that
//! encloses the reference, the evaluator walks outward until a struct
//! declares the reference's head field. Embeds are evaluated in the scope of
//! the struct that holds them and unified into it.

use crate::error::CoreResult;
use crate::path::{Path, Segment};
use crate::unify::unify;
use crate::value::{Field, Reference, Struct, Value};

/// Evaluates values against a fixed raw root
#[derive(Debug)]
pub struct Evaluator<'a> {
    root: &'a Value,
    in_progress: Vec<Path>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over `root`
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            in_progress: Vec::new(),
        }
    }

    /// Evaluate the whole root
    ///
    /// # Errors
    ///
    /// Returns a fill conflict if an embed disagrees with its struct
    pub fn evaluate(&mut self) -> CoreResult<Value> {
        let root = self.root;
        self.eval(root, &Path::root(), &Path::root())
    }

    /// Absolute path a reference written inside `scope` points to
    ///
    /// Only fields declared in the raw tree take part in resolution.
    #[must_use]
    pub fn resolve(&self, reference: &Reference, scope: &Path) -> Option<Path> {
        let head = reference.path.head()?;
        (0..=scope.len()).rev().find_map(|len| {
            let prefix = scope.prefix(len);
            match self.root.get_path(&prefix) {
                Some(Value::Struct(s)) if s.fields.contains_key(head) => {
                    Some(prefix.join(&reference.path))
                }
                _ => None,
            }
        })
    }

    /// Evaluated value at an absolute path
    ///
    /// Returns `None` if the path does not exist or reaches back into a
    /// value that is still being evaluated.
    ///
    /// # Errors
    ///
    /// Returns a fill conflict if an embed on the way disagrees with its struct
    pub fn lookup(&mut self, path: &Path) -> CoreResult<Option<Value>> {
        if self.in_progress.contains(path) {
            return Ok(None);
        }
        self.in_progress.push(path.clone());
        let result = self.lookup_raw(path);
        self.in_progress.pop();
        result
    }

    fn lookup_raw(&mut self, path: &Path) -> CoreResult<Option<Value>> {
        let root = self.root;
        let mut current = root;
        let mut at = Path::root();

        for (i, segment) in path.segments().iter().enumerate() {
            let next = match (current, segment) {
                // embeds may add to or clash with any field
                (Value::Struct(s), _) if !s.embeds.is_empty() => None,
                (Value::Struct(s), Segment::Field(name)) => match s.fields.get(name) {
                    Some(field) => Some(&field.value),
                    None => return Ok(None),
                },
                (Value::List(items), Segment::Index(idx)) => match items.get(*idx) {
                    Some(item) => Some(item),
                    None => return Ok(None),
                },
                (Value::Ref(_), _) => None,
                _ => return Ok(None),
            };

            match next {
                Some(value) => {
                    current = value;
                    at = match segment {
                        Segment::Field(name) => at.field(name.as_str()),
                        Segment::Index(idx) => at.index(*idx),
                    };
                }
                None => {
                    // the rest of the path only exists after evaluation
                    let evaluated = self.eval(current, &at, &at.enclosing_struct())?;
                    if matches!(evaluated, Value::Ref(_)) {
                        return Ok(None);
                    }
                    let rest = Path::from_segments(path.segments()[i..].to_vec());
                    return Ok(evaluated.get_path(&rest).cloned());
                }
            }
        }

        self.eval(current, &at, &at.enclosing_struct()).map(Some)
    }

    /// Evaluate `value` located at `at`, resolving references from `scope`
    ///
    /// # Errors
    ///
    /// Returns a fill conflict if an embed disagrees with its struct
    pub fn eval(&mut self, value: &Value, at: &Path, scope: &Path) -> CoreResult<Value> {
        match value {
            Value::Struct(s) => self.eval_struct(s, at),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.eval(item, &at.index(i), scope))
                .collect::<CoreResult<Vec<_>>>()
                .map(Value::List),
            Value::Ref(reference) => self.eval_ref(reference, at, scope),
            other => Ok(other.clone()),
        }
    }

    fn eval_ref(&mut self, reference: &Reference, at: &Path, scope: &Path) -> CoreResult<Value> {
        let unresolved = Value::Ref(reference.clone());
        let Some(target) = self.resolve(reference, scope) else {
            return Ok(unresolved);
        };
        // a value cannot contain itself
        if at.starts_with(&target) {
            return Ok(unresolved);
        }
        Ok(match self.lookup(&target)? {
            Some(Value::Ref(_)) | None => unresolved,
            Some(value) => value,
        })
    }

    fn eval_struct(&mut self, s: &Struct, at: &Path) -> CoreResult<Value> {
        let mut own = Struct::new();
        for (name, field) in &s.fields {
            let value = self.eval(&field.value, &at.field(name.as_str()), at)?;
            own.fields.insert(
                name.clone(),
                Field::new(value).with_directives(field.directives.clone()),
            );
        }
        if s.embeds.is_empty() {
            return Ok(Value::Struct(own));
        }

        let mut merged: Option<Value> = None;
        let mut pending = Vec::new();
        for embed in &s.embeds {
            match self.eval(embed, at, at)? {
                embedded @ Value::Struct(_) => {
                    merged = Some(match merged {
                        Some(acc) => unify(&acc, &embedded, at)?,
                        None => embedded,
                    });
                }
                unresolved => pending.push(unresolved),
            }
        }

        let own = Value::Struct(own);
        let mut result = match merged {
            Some(acc) => unify(&acc, &own, at)?,
            None => own,
        };
        if let Value::Struct(out) = &mut result {
            out.embeds.extend(pending);
        }
        Ok(result)
    }
}

/// Evaluate a whole raw tree
///
/// # Errors
///
/// Returns a fill conflict if an embed disagrees with its struct
pub fn evaluate(root: &Value) -> CoreResult<Value> {
    Evaluator::new(root).evaluate()
}
