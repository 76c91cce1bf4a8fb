//! Conversion between JSON documents and partial values.
//!
//! Whole-string scalars of the form `${ term @directive... }` are
//! expressions. A term is a kind keyword (`string`, `int`, `number`,
//! `bool`, `_`) or a reference path. A mapping key `<<` embeds values into
//! the enclosing struct. `$${` escapes a literal `${`.

use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use crate::value::{Directive, Field, Kind, Reference, Struct, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

/// Mapping key that embeds values into the enclosing struct
pub const EMBED_KEY: &str = "<<";

static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{(?s)(.*)\}$").expect("expression regex is valid"));

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^@([A-Za-z_][A-Za-z0-9_]*)(?:\(\s*"?([^)"]*)"?\s*\))?$"#)
        .expect("directive regex is valid")
});

/// Parse a JSON document into a partial value
///
/// # Errors
///
/// Returns error if an expression is malformed or a directive is placed
/// where no field can carry it
pub fn from_json(json: &serde_json::Value) -> CoreResult<Value> {
    let (value, directives) = parse_node(json)?;
    if !directives.is_empty() {
        return Err(CoreError::parse(
            json.to_string(),
            "directives are only allowed on struct fields",
        ));
    }
    Ok(value)
}

fn parse_node(json: &serde_json::Value) -> CoreResult<(Value, Vec<Directive>)> {
    Ok(match json {
        serde_json::Value::Null => (Value::Null, Vec::new()),
        serde_json::Value::Bool(b) => (Value::Bool(*b), Vec::new()),
        serde_json::Value::Number(n) => (Value::Number(n.clone()), Vec::new()),
        serde_json::Value::String(s) => parse_string(s)?,
        serde_json::Value::Array(items) => {
            let items = items.iter().map(from_json).collect::<CoreResult<Vec<_>>>()?;
            (Value::List(items), Vec::new())
        }
        serde_json::Value::Object(map) => {
            let mut s = Struct::new();
            for (key, child) in map {
                if key == EMBED_KEY {
                    match child {
                        serde_json::Value::Array(items) => {
                            for item in items {
                                s.embeds.push(from_json(item)?);
                            }
                        }
                        other => s.embeds.push(from_json(other)?),
                    }
                    continue;
                }
                let (value, directives) = parse_node(child)?;
                s.fields
                    .insert(key.clone(), Field::new(value).with_directives(directives));
            }
            (Value::Struct(s), Vec::new())
        }
    })
}

fn parse_string(s: &str) -> CoreResult<(Value, Vec<Directive>)> {
    if let Some(literal) = s.strip_prefix("$${") {
        return Ok((Value::String(format!("${{{}", literal)), Vec::new()));
    }
    match EXPRESSION.captures(s) {
        Some(caps) => parse_expression(s, &caps[1]),
        None => Ok((Value::String(s.to_string()), Vec::new())),
    }
}

/// Parse the inside of a `${...}` expression
///
/// # Errors
///
/// Returns error if the term or a directive is malformed
pub fn parse_expression(source: &str, body: &str) -> CoreResult<(Value, Vec<Directive>)> {
    let mut parts = body.split_whitespace();
    let term = parts
        .next()
        .ok_or_else(|| CoreError::parse(source, "empty expression"))?;
    if term.starts_with('@') {
        return Err(CoreError::parse(source, "expression needs a term before directives"));
    }

    let value = match Kind::from_keyword(term) {
        Some(kind) => Value::Kind(kind),
        None => {
            let path = Path::parse(term)?;
            if path.head().is_none() {
                return Err(CoreError::parse(source, "reference must start with a field name"));
            }
            Value::Ref(Reference { path })
        }
    };

    let directives = parts
        .map(|word| parse_directive(source, word))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok((value, directives))
}

fn parse_directive(source: &str, word: &str) -> CoreResult<Directive> {
    let caps = DIRECTIVE
        .captures(word)
        .ok_or_else(|| CoreError::parse(source, format!("malformed directive `{}`", word)))?;
    let arg = caps.get(2).map(|m| m.as_str().trim().to_string());
    match (&caps[1], arg) {
        ("generate", None) => Ok(Directive::Generate),
        ("required", None) => Ok(Directive::Required),
        ("file", Some(path)) if !path.is_empty() => Ok(Directive::FromFile(PathBuf::from(path))),
        ("env", Some(name)) if !name.is_empty() => Ok(Directive::FromEnv(name)),
        (name, _) => Err(CoreError::parse(
            source,
            format!("unknown directive or bad argument `@{}`", name),
        )),
    }
}

/// Render a value back to JSON
///
/// Incomplete values render as expressions, so a rendered document parses
/// back to an equivalent value.
#[must_use]
pub fn to_json(value: &Value) -> serde_json::Value {
    render(value, &[], true)
}

/// Render a value as plain data for consumers outside the engine
///
/// Strings are emitted as they are, without the `$${` escape, so the
/// result is not meant to be parsed back.
#[must_use]
pub fn to_plain_json(value: &Value) -> serde_json::Value {
    render(value, &[], false)
}

fn render(value: &Value, directives: &[Directive], escape: bool) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) if escape && s.starts_with("${") => {
            serde_json::Value::String(format!("${}", s))
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(|item| render(item, &[], escape)).collect(),
        ),
        Value::Struct(s) => {
            let mut map = serde_json::Map::new();
            if !s.embeds.is_empty() {
                map.insert(
                    EMBED_KEY.to_string(),
                    serde_json::Value::Array(
                        s.embeds.iter().map(|embed| render(embed, &[], escape)).collect(),
                    ),
                );
            }
            for (name, field) in &s.fields {
                map.insert(name.clone(), render(&field.value, &field.directives, escape));
            }
            serde_json::Value::Object(map)
        }
        Value::Kind(kind) => expression(kind.keyword(), directives),
        Value::Ref(r) => expression(&r.path.to_string(), directives),
    }
}

fn expression(term: &str, directives: &[Directive]) -> serde_json::Value {
    let mut text = format!("${{{}", term);
    for directive in directives {
        text.push(' ');
        text.push_str(&directive.to_string());
    }
    text.push('}');
    serde_json::Value::String(text)
}
