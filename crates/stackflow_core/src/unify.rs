//! Unification of partial values.

use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use crate::value::{Field, Kind, Struct, Value};

/// Unify `incoming` into `existing`
///
/// `at` is the absolute path of the unified values, used in conflict errors.
///
/// # Errors
///
/// Returns `CoreError::FillConflict` if the two values cannot both hold
pub fn unify(existing: &Value, incoming: &Value, at: &Path) -> CoreResult<Value> {
    match (existing, incoming) {
        // references survive kinds, yield to everything else
        (Value::Ref(_), Value::Ref(_)) => Ok(existing.clone()),
        (Value::Ref(_), Value::Kind(_)) => Ok(existing.clone()),
        (Value::Kind(_), Value::Ref(_)) => Ok(incoming.clone()),
        (Value::Ref(_), other) | (other, Value::Ref(_)) => Ok(other.clone()),

        (Value::Kind(Kind::Top), other) | (other, Value::Kind(Kind::Top)) => Ok(other.clone()),
        (Value::Kind(a), Value::Kind(b)) => a
            .meet(*b)
            .map(Value::Kind)
            .ok_or_else(|| conflict(at, existing, incoming)),
        (Value::Kind(kind), other) | (other, Value::Kind(kind)) => {
            if kind.accepts(other) {
                Ok(other.clone())
            } else {
                Err(conflict(at, existing, incoming))
            }
        }

        (Value::Struct(a), Value::Struct(b)) => unify_structs(a, b, at).map(Value::Struct),
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Err(conflict(at, existing, incoming));
            }
            a.iter()
                .zip(b)
                .enumerate()
                .map(|(i, (x, y))| unify(x, y, &at.index(i)))
                .collect::<CoreResult<Vec<_>>>()
                .map(Value::List)
        }

        (Value::Number(a), Value::Number(b)) if numbers_equal(a, b) => Ok(existing.clone()),
        (a, b) if a.is_scalar() && a == b => Ok(existing.clone()),
        _ => Err(conflict(at, existing, incoming)),
    }
}

fn unify_structs(existing: &Struct, incoming: &Struct, at: &Path) -> CoreResult<Struct> {
    let mut merged = existing.clone();
    for (name, field) in &incoming.fields {
        match merged.fields.get_mut(name) {
            Some(current) => {
                let value = unify(&current.value, &field.value, &at.field(name.as_str()))?;
                current.value = value;
                for directive in &field.directives {
                    if !current.directives.contains(directive) {
                        current.directives.push(directive.clone());
                    }
                }
            }
            None => {
                merged.fields.insert(
                    name.clone(),
                    Field::new(field.value.clone()).with_directives(field.directives.clone()),
                );
            }
        }
    }
    merged.embeds.extend(incoming.embeds.iter().cloned());
    Ok(merged)
}

pub(crate) fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if a == b {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn conflict(at: &Path, existing: &Value, incoming: &Value) -> CoreError {
    CoreError::FillConflict {
        path: at.to_string(),
        existing: existing.describe(),
        incoming: incoming.describe(),
    }
}
