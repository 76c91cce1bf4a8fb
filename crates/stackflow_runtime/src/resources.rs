//! Driver boundary.
//!
//! Drivers consume the `$resources` entries labelled with their name. Entries
//! are handed over with every `$`-prefixed key removed, since those carry
//! engine metadata rather than target configuration. Bodies are plain data:
//! escaped `$${` literals reach drivers as `${`.

use stackflow_core::{ComponentId, CoreError, CoreResult, Document, Path};
use stackflow_plan::{driver_label_path, Stack, RESOURCES_FIELD};

/// One resource addressed to a driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverResource {
    /// Component that emitted it
    pub component: ComponentId,
    /// Key under `$resources`
    pub name: String,
    /// Resource body without `$` keys
    pub value: serde_json::Value,
}

/// Every resource labelled with `driver`, in task order
///
/// # Errors
///
/// Returns error if a task cannot be read from the stack
pub fn resources_for_driver<D: Document>(
    stack: &Stack<D>,
    driver: &str,
) -> CoreResult<Vec<DriverResource>> {
    let mut out = Vec::new();
    for (id, name, resource) in labelled_resources(stack)? {
        if resource.label.as_deref() == Some(driver) {
            out.push(DriverResource {
                component: id,
                name,
                value: strip_meta(&resource.body.export()),
            });
        }
    }
    Ok(out)
}

/// Resources of `driver` merged into a single document
///
/// Returns `None` when the driver has no resources.
///
/// # Errors
///
/// Returns a fill conflict if two resources disagree
pub fn merged_resources<D: Document>(
    stack: &Stack<D>,
    driver: &str,
) -> CoreResult<Option<serde_json::Value>> {
    let resources = resources_for_driver(stack, driver)?;
    if resources.is_empty() {
        return Ok(None);
    }
    let mut merged = serde_json::Value::Object(serde_json::Map::new());
    for resource in &resources {
        merge_plain(&mut merged, &resource.value, &Path::root())?;
    }
    Ok(Some(merged))
}

/// Deep-merge plain data: objects combine, everything else must be equal
fn merge_plain(
    into: &mut serde_json::Value,
    incoming: &serde_json::Value,
    at: &Path,
) -> CoreResult<()> {
    match (into, incoming) {
        (serde_json::Value::Object(existing), serde_json::Value::Object(fields)) => {
            for (key, value) in fields {
                match existing.get_mut(key) {
                    Some(current) => merge_plain(current, value, &at.field(key.as_str()))?,
                    None => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(())
        }
        (existing, incoming) if *existing == *incoming => Ok(()),
        (existing, incoming) => Err(CoreError::FillConflict {
            path: at.to_string(),
            existing: existing.to_string(),
            incoming: incoming.to_string(),
        }),
    }
}

/// Distinct driver labels in first-use order
///
/// # Errors
///
/// Returns error if a task cannot be read from the stack
pub fn drivers_in_use<D: Document>(stack: &Stack<D>) -> CoreResult<Vec<String>> {
    let mut drivers: Vec<String> = Vec::new();
    for (_, _, resource) in labelled_resources(stack)? {
        if let Some(label) = resource.label {
            if !drivers.contains(&label) {
                drivers.push(label);
            }
        }
    }
    Ok(drivers)
}

/// Remove every `$`-prefixed key, recursively
#[must_use]
pub fn strip_meta(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(key, _)| !key.starts_with('$'))
                .map(|(key, v)| (key.clone(), strip_meta(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(strip_meta).collect())
        }
        other => other.clone(),
    }
}

struct Labelled<D> {
    label: Option<String>,
    body: D,
}

fn labelled_resources<D: Document>(
    stack: &Stack<D>,
) -> CoreResult<Vec<(ComponentId, String, Labelled<D>)>> {
    let driver = driver_label_path();
    let mut out = Vec::new();
    for id in stack.tasks() {
        let component = stack.get_component(id)?;
        let Some(resources) = component.lookup(&Path::root().field(RESOURCES_FIELD)) else {
            continue;
        };
        for (name, body) in resources.fields() {
            let label = body.lookup(&driver).and_then(|l| l.as_string());
            out.push((id.clone(), name, Labelled { label, body }));
        }
    }
    Ok(out)
}
