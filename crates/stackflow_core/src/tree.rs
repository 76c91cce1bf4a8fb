//! `Tree`: the shipped document model.
//!
//! A tree stores the raw value as written, references and embeds included.
//! Fills merge into the raw value, so references keep pointing at their
//! targets across fills; views evaluate on demand.

use crate::document::{DirectiveField, Document, ExprReference, Incomplete};
use crate::error::{CoreError, CoreResult};
use crate::eval::{evaluate, Evaluator};
use crate::expr;
use crate::leaves::{leaves_of, Leaf};
use crate::path::{Path, Segment};
use crate::unify::{numbers_equal, unify};
use crate::value::{Field, Kind, Reference, Value};

/// Document model backed by a raw [`Value`]
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: Value,
}

impl Tree {
    /// Wrap a raw value
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The raw value, unevaluated
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.root
    }

    /// Consume into the raw value
    #[must_use]
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Evaluated value
    fn view(&self) -> CoreResult<Value> {
        evaluate(&self.root)
    }

    /// Evaluated value for rendering; a conflicting tree renders as written
    fn rendered(&self) -> Value {
        self.view().unwrap_or_else(|_| self.root.clone())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document for Tree {
    fn empty() -> Self {
        Self::new(Value::empty_struct())
    }

    fn from_json(json: &serde_json::Value) -> CoreResult<Self> {
        expr::from_json(json).map(Self::new)
    }

    fn to_json(&self) -> serde_json::Value {
        expr::to_json(&self.rendered())
    }

    fn export(&self) -> serde_json::Value {
        expr::to_plain_json(&self.rendered())
    }

    fn evaluate(&self) -> CoreResult<Self> {
        evaluate(&self.root).map(Self::new)
    }

    fn try_lookup(&self, path: &Path) -> CoreResult<Option<Self>> {
        Ok(Evaluator::new(&self.root).lookup(path)?.map(Self::new))
    }

    fn detach(&self, path: &Path) -> Option<Self> {
        let Some(raw) = self.root.get_path(path) else {
            return self.lookup(path);
        };
        let mut evaluator = Evaluator::new(&self.root);

        // a template written as a reference is detached from its definition
        let (at, raw) = match raw {
            Value::Ref(r) => template_of(&evaluator, &self.root, r, &path.enclosing_struct())
                .unwrap_or((path.clone(), raw)),
            _ => (path.clone(), raw),
        };
        Some(Self::new(detach_value(
            &mut evaluator,
            &self.root,
            raw,
            &at,
            &at.enclosing_struct(),
            &at,
        )))
    }

    fn fill(&self, path: &Path, value: &Self) -> CoreResult<Self> {
        let path = canonical_path(&self.root, path);
        let mut root = self.root.clone();
        fill_at(&mut root, path.segments(), &value.root, &Path::root())?;
        Ok(Self::new(root))
    }

    fn fields(&self) -> Vec<(String, Self)> {
        match self.rendered() {
            Value::Struct(s) => s
                .fields
                .into_iter()
                .map(|(name, field)| (name, Self::new(field.value)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn elements(&self) -> Vec<Self> {
        match self.rendered() {
            Value::List(items) => items.into_iter().map(Self::new).collect(),
            _ => Vec::new(),
        }
    }

    fn as_string(&self) -> Option<String> {
        match self.view() {
            Ok(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    fn is_concrete(&self) -> bool {
        self.view().is_ok_and(|view| view.is_concrete())
    }

    fn incomplete(&self) -> Vec<Incomplete> {
        let view = match self.view() {
            Ok(view) => view,
            Err(err) => {
                return vec![Incomplete {
                    path: Path::root(),
                    reason: err.to_string(),
                }];
            }
        };
        let mut out = Vec::new();
        collect_incomplete(&view, &Path::root(), &mut out);
        out
    }

    fn admits(&self, value: &Self) -> CoreResult<bool> {
        admits_value(&self.view()?, &value.view()?, &Path::root())
    }

    fn equals(&self, other: &Self) -> bool {
        match (self.view(), other.view()) {
            (Ok(a), Ok(b)) => a.same(&b),
            _ => false,
        }
    }

    fn directive_fields(&self) -> Vec<DirectiveField> {
        let mut out = Vec::new();
        collect_directives(&self.rendered(), &self.root, &Path::root(), &mut out);
        out
    }

    fn references(&self, path: &Path) -> Vec<ExprReference> {
        let Some(start) = self.root.get_path(path) else {
            return Vec::new();
        };
        let evaluator = Evaluator::new(&self.root);
        let mut out = Vec::new();
        collect_references(&evaluator, start, path, &path.enclosing_struct(), &mut out);
        out
    }

    fn leaves(&self) -> Vec<Leaf> {
        leaves_of(&self.rendered())
    }
}

/// Path `path` reaches once every reference along it is followed
///
/// A fill through a reference lands on the reference's target, so aliases
/// of a value stay aliases. References that do not resolve to a declared
/// field are left in place.
fn canonical_path(root: &Value, path: &Path) -> Path {
    let evaluator = Evaluator::new(root);
    let mut current = path.clone();
    let mut seen: Vec<Path> = Vec::new();
    'follow: loop {
        for len in 1..=current.len() {
            let prefix = current.prefix(len);
            let Some(Value::Ref(reference)) = root.get_path(&prefix) else {
                continue;
            };
            let Some(target) = evaluator.resolve(reference, &prefix.enclosing_struct()) else {
                break 'follow;
            };
            if prefix.starts_with(&target) || seen.contains(&target) || root.get_path(&target).is_none() {
                break 'follow;
            }
            seen.push(target.clone());
            let rest = Path::from_segments(current.segments()[len..].to_vec());
            current = target.join(&rest);
            continue 'follow;
        }
        break;
    }
    current
}

fn fill_at(node: &mut Value, segments: &[Segment], incoming: &Value, at: &Path) -> CoreResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        *node = unify(node, incoming, at)?;
        return Ok(());
    };
    if matches!(node, Value::Kind(Kind::Top)) && matches!(first, Segment::Field(_)) {
        *node = Value::empty_struct();
    }
    match (node, first) {
        (Value::Struct(s), Segment::Field(name)) => {
            let next = at.field(name.as_str());
            let field = s
                .fields
                .entry(name.clone())
                .or_insert_with(|| Field::new(Value::top()));
            fill_at(&mut field.value, rest, incoming, &next)
        }
        (Value::List(items), Segment::Index(i)) => {
            let next = at.index(*i);
            match items.get_mut(*i) {
                Some(item) => fill_at(item, rest, incoming, &next),
                None => Err(CoreError::NotFound {
                    kind: "List element".to_string(),
                    id: next.to_string(),
                }),
            }
        }
        (other, _) => Err(CoreError::FillConflict {
            path: at.to_string(),
            existing: other.describe(),
            incoming: format!("value at {}", Path::from_segments(segments.to_vec())),
        }),
    }
}

fn detach_value(
    evaluator: &mut Evaluator<'_>,
    root: &Value,
    value: &Value,
    at: &Path,
    scope: &Path,
    base: &Path,
) -> Value {
    match value {
        Value::Ref(r) => match evaluator.resolve(r, scope) {
            Some(target) if !target.starts_with(base) => match evaluator.lookup(&target) {
                Ok(Some(resolved)) if !matches!(resolved, Value::Ref(_)) => resolved,
                _ => value.clone(),
            },
            _ => value.clone(),
        },
        Value::List(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| detach_value(evaluator, root, item, &at.index(i), scope, base))
                .collect(),
        ),
        Value::Struct(s) => {
            let mut out = s.clone();
            for (name, field) in &mut out.fields {
                let child = at.field(name.as_str());
                field.value = detach_value(evaluator, root, &field.value, &child, at, base);
            }

            // embedded templates are inlined as written, the struct's own
            // fields refine them
            let mut templates = Vec::new();
            out.embeds = Vec::new();
            for embed in &s.embeds {
                let template = match embed {
                    Value::Ref(r) => template_of(evaluator, root, r, at)
                        .filter(|(target, raw)| {
                            !target.starts_with(base) && matches!(raw, Value::Struct(_))
                        }),
                    _ => None,
                };
                match template {
                    Some((target, raw)) => templates.push((
                        embed,
                        detach_value(
                            evaluator,
                            root,
                            raw,
                            &target,
                            &target.enclosing_struct(),
                            &target,
                        ),
                    )),
                    None => out
                        .embeds
                        .push(detach_value(evaluator, root, embed, at, at, base)),
                }
            }

            let mut merged = Value::Struct(out);
            for (embed, template) in templates {
                match unify(&template, &merged, at) {
                    Ok(value) => merged = value,
                    Err(_) => {
                        // left unresolved; the conflict surfaces as incomplete
                        if let Value::Struct(m) = &mut merged {
                            m.embeds.push(embed.clone());
                        }
                    }
                }
            }
            merged
        }
        other => other.clone(),
    }
}

/// Raw definition a reference points at, following reference chains
fn template_of<'v>(
    evaluator: &Evaluator<'_>,
    root: &'v Value,
    reference: &Reference,
    scope: &Path,
) -> Option<(Path, &'v Value)> {
    let mut target = evaluator.resolve(reference, scope)?;
    let mut raw = root.get_path(&target)?;
    let mut seen = vec![target.clone()];
    while let Value::Ref(next) = raw {
        let Some(next_target) = evaluator.resolve(next, &target.enclosing_struct()) else {
            break;
        };
        let Some(next_raw) = root.get_path(&next_target) else {
            break;
        };
        if seen.contains(&next_target) {
            break;
        }
        seen.push(next_target.clone());
        target = next_target;
        raw = next_raw;
    }
    Some((target, raw))
}

fn collect_incomplete(value: &Value, at: &Path, out: &mut Vec<Incomplete>) {
    match value {
        Value::Kind(kind) => out.push(Incomplete {
            path: at.clone(),
            reason: format!("incomplete value {}", kind.keyword()),
        }),
        Value::Ref(r) => out.push(Incomplete {
            path: at.clone(),
            reason: format!("unresolved reference {}", r),
        }),
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_incomplete(item, &at.index(i), out);
            }
        }
        Value::Struct(s) => {
            for embed in &s.embeds {
                out.push(Incomplete {
                    path: at.clone(),
                    reason: format!("unresolved embed {}", embed.describe()),
                });
            }
            for (name, field) in &s.fields {
                collect_incomplete(&field.value, &at.field(name.as_str()), out);
            }
        }
        _ => {}
    }
}

fn admits_value(pattern: &Value, value: &Value, at: &Path) -> CoreResult<bool> {
    match pattern {
        Value::Ref(r) => {
            return Err(CoreError::Validation {
                field: at.to_string(),
                reason: format!("pattern contains unresolved reference {}", r),
            });
        }
        Value::Struct(s) if !s.embeds.is_empty() => {
            return Err(CoreError::Validation {
                field: at.to_string(),
                reason: "pattern contains an unresolved embed".to_string(),
            });
        }
        _ => {}
    }
    if matches!(value, Value::Kind(_) | Value::Ref(_)) {
        return Ok(false);
    }

    Ok(match (pattern, value) {
        (Value::Kind(kind), v) => kind.accepts(v),
        (Value::Struct(p), Value::Struct(v)) => {
            for (name, field) in &p.fields {
                let Some(actual) = v.get(name) else {
                    return Ok(false);
                };
                if !admits_value(&field.value, actual, &at.field(name.as_str()))? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::List(p), Value::List(v)) => {
            if p.len() != v.len() {
                return Ok(false);
            }
            for (i, (x, y)) in p.iter().zip(v).enumerate() {
                if !admits_value(x, y, &at.index(i))? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (p, v) => p.is_scalar() && p == v,
    })
}

fn collect_directives(view: &Value, raw: &Value, at: &Path, out: &mut Vec<DirectiveField>) {
    match view {
        Value::Struct(s) => {
            for (name, field) in &s.fields {
                let path = at.field(name.as_str());
                if !field.directives.is_empty() {
                    out.push(DirectiveField {
                        path: path.clone(),
                        directives: field.directives.clone(),
                        kind: match field.value {
                            Value::Kind(kind) => Some(kind),
                            _ => None,
                        },
                        concrete: field.value.is_concrete(),
                        reference: matches!(raw.get_path(&path), Some(Value::Ref(_))),
                    });
                }
                collect_directives(&field.value, raw, &path, out);
            }
        }
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_directives(item, raw, &at.index(i), out);
            }
        }
        _ => {}
    }
}

fn collect_references(
    evaluator: &Evaluator<'_>,
    value: &Value,
    at: &Path,
    scope: &Path,
    out: &mut Vec<ExprReference>,
) {
    match value {
        Value::Ref(r) => out.push(ExprReference {
            at: at.clone(),
            expr: r.path.clone(),
            target: evaluator.resolve(r, scope),
        }),
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_references(evaluator, item, &at.index(i), scope, out);
            }
        }
        Value::Struct(s) => {
            for embed in &s.embeds {
                collect_references(evaluator, embed, at, at, out);
            }
            for (name, field) in &s.fields {
                collect_references(evaluator, &field.value, &at.field(name.as_str()), at, out);
            }
        }
        _ => {}
    }
}
