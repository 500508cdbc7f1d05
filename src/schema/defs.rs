//! `$ref` expansion against the document's own `$defs`.
//!
//! Runs on the raw document before the arena is laid out. Every schema
//! position reachable through `properties`, `items` and the compositions is
//! visited; a node holding `$ref` is replaced by a copy of the definition
//! with the referencing node's own fields merged on top.
use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{CompileError, StepError};

const STEP: &str = "reference resolution";

pub(crate) fn resolve_references(document: &mut Value) -> Result<(), CompileError> {
    let mut resolver = Resolver { definitions: definitions(document), active: Vec::new() };
    resolver.node(document, "")
}

/// Definition table keyed by `<$id>#/$defs/<name>`, plus the local
/// `#/$defs/<name>` form.
fn definitions(document: &Value) -> HashMap<String, Value> {
    let id = document.get("$id").and_then(Value::as_str).unwrap_or_default();
    let mut table = HashMap::new();
    if let Some(defs) = document.get("$defs").and_then(Value::as_object) {
        for (name, definition) in defs {
            table.insert(format!("{id}#/$defs/{name}"), definition.clone());
            table.insert(format!("#/$defs/{name}"), definition.clone());
        }
    }
    table
}

struct Resolver {
    definitions: HashMap<String, Value>,
    /// References being expanded on the current descent.
    active: Vec<String>,
}

impl Resolver {
    fn node(&mut self, node: &mut Value, pointer: &str) -> Result<(), CompileError> {
        let mut expanded = Vec::new();
        while let Some(reference) = node.get("$ref").and_then(Value::as_str).map(str::to_string) {
            if self.active.contains(&reference) || expanded.contains(&reference) {
                return Err(CompileError::step(pointer, STEP, StepError::RecursiveDefinition(reference)));
            }
            let Some(definition) = self.definitions.get(&reference).cloned() else {
                return Err(CompileError::step(pointer, STEP, StepError::DefinitionNotFound(reference)));
            };
            tracing::trace!(pointer, reference, "expanding definition");
            *node = merge(definition, node);
            expanded.push(reference);
        }

        let depth = self.active.len();
        self.active.extend(expanded);
        let result = self.children(node, pointer);
        self.active.truncate(depth);
        result
    }

    fn children(&mut self, node: &mut Value, pointer: &str) -> Result<(), CompileError> {
        let Some(map) = node.as_object_mut() else {
            return Ok(());
        };
        if let Some(Value::Object(properties)) = map.get_mut("properties") {
            for (name, child) in properties.iter_mut() {
                self.node(child, &format!("{pointer}/{name}"))?;
            }
        }
        if let Some(items) = map.get_mut("items") {
            self.node(items, &format!("{pointer}/*"))?;
        }
        for keyword in ["oneOf", "anyOf", "allOf"] {
            if let Some(Value::Array(list)) = map.get_mut(keyword) {
                for (i, child) in list.iter_mut().enumerate() {
                    self.node(child, &format!("{pointer}/{keyword}/{i}"))?;
                }
            }
        }
        Ok(())
    }
}

/// Copy of `definition` overlaid with every field of `referencing` but
/// `$ref`.
fn merge(definition: Value, referencing: &Value) -> Value {
    let Value::Object(mut merged) = definition else {
        return definition;
    };
    let fields = referencing.as_object().cloned().unwrap_or_else(Map::new);
    for (name, value) in fields {
        if name != "$ref" {
            merged.insert(name, value);
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_and_lets_referencing_fields_win() {
        let mut document = json!({
            "$id": "test",
            "$defs": { "pet": { "type": "string", "enum": ["cat", "dog"], "_hidden": true } },
            "type": "object",
            "properties": {
                "a": { "$ref": "test#/$defs/pet", "_hidden": false },
                "b": { "type": "array", "items": { "oneOf": [ { "$ref": "#/$defs/pet" } ] } }
            }
        });
        resolve_references(&mut document).unwrap();
        assert_eq!(document["properties"]["a"]["enum"], json!(["cat", "dog"]));
        assert_eq!(document["properties"]["a"]["_hidden"], json!(false));
        assert!(document["properties"]["a"].get("$ref").is_none());
        assert_eq!(document["properties"]["b"]["items"]["oneOf"][0]["type"], json!("string"));
    }

    #[test]
    fn missing_definition_reports_pointer() {
        let mut document = json!({
            "$id": "test",
            "$defs": { "pet": { "type": "string" } },
            "type": "object",
            "properties": { "a": { "$ref": "test#/$defs/missing" } }
        });
        match resolve_references(&mut document).unwrap_err() {
            CompileError::Step { pointer, step, source: StepError::DefinitionNotFound(reference) } => {
                assert_eq!(pointer, "/a");
                assert_eq!(step, STEP);
                assert_eq!(reference, "test#/$defs/missing");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn self_reference_is_rejected() {
        let mut document = json!({
            "$defs": {
                "node": { "type": "object", "properties": { "next": { "$ref": "#/$defs/node" } } }
            },
            "type": "object",
            "properties": { "head": { "$ref": "#/$defs/node" } }
        });
        let err = resolve_references(&mut document).unwrap_err();
        assert!(matches!(err, CompileError::Step { source: StepError::RecursiveDefinition(_), .. }));
    }
}
