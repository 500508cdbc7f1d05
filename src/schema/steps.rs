//! Compile steps run by [`SchemaCompiler`](super::SchemaCompiler).
//!
//! A step is tried on every node of every walk of its pass. `condition`
//! keeps re-entry harmless; `apply` fills in the node's compiled fields.
use serde_json::Value;

use crate::expr::CompiledExpr;
use crate::expr::eval::truthy;

use super::node::{DynAttr, NodeId, OrderEntry, SchemaTree, SchemaType};
use super::validate::ValidationEngine;
use super::StepError;

pub(crate) trait CompileStep {
    fn name(&self) -> &'static str;

    fn condition(&self, _tree: &SchemaTree, _id: NodeId) -> bool {
        true
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError>;
}

pub(crate) type Pass = Vec<Box<dyn CompileStep>>;

/// The ordered passes. Pass two relies on the types and enum flags set by
/// pass one.
pub(crate) fn passes(engine: &ValidationEngine) -> Vec<Pass> {
    let first: Pass = vec![Box::new(TypeStep), Box::new(EnumStep), Box::new(UniformStep), Box::new(OrderStep)];
    let mut second: Pass = vec![Box::new(ValidateStep { engine: engine.clone() })];
    second.extend(DynAttr::ALL.into_iter().map(|attr| Box::new(ExprStep { attr }) as Box<dyn CompileStep>));
    vec![first, second]
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE
// ————————————————————————————————————————————————————————————————————————————

struct TypeStep;

impl CompileStep for TypeStep {
    fn name(&self) -> &'static str {
        "type normalization"
    }

    fn condition(&self, tree: &SchemaTree, id: NodeId) -> bool {
        tree.node(id).ty.is_none()
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError> {
        let types = match tree.node(id).fragment.get("type") {
            None => vec!["string".to_string()],
            Some(Value::String(name)) => vec![name.clone()],
            Some(Value::Array(list)) => list
                .iter()
                .map(|t| t.as_str().map(str::to_string).ok_or_else(|| StepError::UnknownType(t.to_string())))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(StepError::UnknownType(other.to_string())),
        };
        let parse = |name: &str| SchemaType::parse(name).ok_or_else(|| StepError::UnknownType(name.to_string()));
        let (ty, nullable) = match types.as_slice() {
            [single] => {
                let ty = parse(single.as_str())?;
                (ty, ty == SchemaType::Null)
            }
            [a, b] if a == "null" => (parse(b.as_str())?, true),
            [a, b] if b == "null" => (parse(a.as_str())?, true),
            [_, _] => return Err(StepError::MissingNullInUnion(types.clone())),
            _ => return Err(StepError::UnsupportedUnion(types.clone())),
        };
        let node = tree.node_mut(id);
        node.ty = Some(ty);
        node.nullable = nullable;
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ENUM
// ————————————————————————————————————————————————————————————————————————————

struct EnumStep;

/// Every present composition is a non-empty list of `const` schemas, and
/// at least one is present.
fn all_const_alternatives(fragment: &Value, keywords: &[&str]) -> bool {
    let lists: Vec<&Vec<Value>> = keywords.iter().filter_map(|k| fragment.get(*k)?.as_array()).collect();
    !lists.is_empty()
        && lists
            .iter()
            .all(|list| !list.is_empty() && list.iter().all(|alt| alt.get("const").is_some()))
}

impl CompileStep for EnumStep {
    fn name(&self) -> &'static str {
        "enum detection"
    }

    fn condition(&self, tree: &SchemaTree, id: NodeId) -> bool {
        tree.node(id).is_enum.is_none()
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError> {
        let node = tree.node(id);
        let fragment = &node.fragment;

        let enum_array = node.ty() == SchemaType::Array
            && fragment.get("uniqueItems") == Some(&Value::Bool(true))
            && fragment.get("items").is_some_and(|items| {
                items.get("enum").is_some() || all_const_alternatives(items, &["oneOf", "anyOf", "allOf"])
            });
        let is_enum = !enum_array
            && (fragment.get("enum").is_some()
                || all_const_alternatives(fragment, &["oneOf"])
                || all_const_alternatives(fragment, &["anyOf"]));
        let default_only = is_enum && fragment.get(DynAttr::Only.keyword()).is_none();
        let pointer = node.pointer.clone();

        let node = tree.node_mut(id);
        node.is_enum_array = enum_array;
        node.is_enum = Some(is_enum);
        if default_only && node.attrs[DynAttr::Only.index()].is_none() {
            node.attrs[DynAttr::Only.index()] = Some(CompiledExpr::constant(
                DynAttr::Only.keyword(),
                &pointer,
                DynAttr::Only.kind(),
                Value::Bool(true),
            ));
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// UNIFORM
// ————————————————————————————————————————————————————————————————————————————

struct UniformStep;

impl CompileStep for UniformStep {
    fn name(&self) -> &'static str {
        "array uniformity"
    }

    fn condition(&self, tree: &SchemaTree, id: NodeId) -> bool {
        let node = tree.node(id);
        node.ty() == SchemaType::Array && node.uniform.is_none()
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError> {
        let composed = tree.node(id).fragment.get("items").is_some_and(|items| {
            ["oneOf", "anyOf", "allOf"].iter().any(|k| items.get(*k).is_some())
        });
        tree.node_mut(id).uniform = Some(!composed);
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ORDER
// ————————————————————————————————————————————————————————————————————————————

struct OrderStep;

/// A property's `_tab`/`_group` marker when set to something truthy.
fn marker(schema: &Value, keyword: &str) -> Option<Value> {
    schema.get(keyword).filter(|v| truthy(v)).cloned()
}

impl CompileStep for OrderStep {
    fn name(&self) -> &'static str {
        "field order"
    }

    fn condition(&self, tree: &SchemaTree, id: NodeId) -> bool {
        let node = tree.node(id);
        node.ty() == SchemaType::Object && node.fragment.get("properties").is_some() && node.order.is_none()
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError> {
        let Some(properties) = tree.node(id).fragment.get("properties").and_then(Value::as_object) else {
            return Ok(());
        };
        let mut tabs: Vec<(Value, usize)> = Vec::new();
        let mut groups: Vec<(Value, usize)> = Vec::new();
        let first_seen = |seen: &mut Vec<(Value, usize)>, marker: &Option<Value>, field_index: usize| match marker {
            None => field_index,
            Some(m) => match seen.iter().find(|(v, _)| v == m) {
                Some((_, index)) => *index,
                None => {
                    seen.push((m.clone(), field_index));
                    field_index
                }
            },
        };

        let mut entries: Vec<OrderEntry> = properties
            .iter()
            .enumerate()
            .map(|(field_index, (field, schema))| {
                let tab = marker(schema, "_tab");
                let group = marker(schema, "_group");
                let tab_index = first_seen(&mut tabs, &tab, field_index);
                let group_index = first_seen(&mut groups, &group, field_index);
                OrderEntry { field: field.clone(), field_index, tab, tab_index, group, group_index }
            })
            .collect();
        entries.sort_by_key(|e| (e.tab_index.min(e.group_index).min(e.field_index), e.field_index));

        tree.node_mut(id).order = Some(entries);
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALIDATE
// ————————————————————————————————————————————————————————————————————————————

struct ValidateStep {
    engine: ValidationEngine,
}

impl CompileStep for ValidateStep {
    fn name(&self) -> &'static str {
        "validator binding"
    }

    fn condition(&self, tree: &SchemaTree, id: NodeId) -> bool {
        tree.node(id).validator.is_none()
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError> {
        let node = tree.node(id);
        let fragment = with_root_definitions(&node.fragment, &tree.node(node.root).fragment);
        let validator = self.engine.compile(&fragment).map_err(StepError::Validator)?;
        tree.node_mut(id).validator = Some(validator);
        Ok(())
    }
}

/// Copy of `fragment` carrying the root's `$defs` (and `$id`), so a `$ref`
/// left under keywords the expansion pass does not walk still resolves.
fn with_root_definitions(fragment: &Value, root: &Value) -> Value {
    let mut fragment = fragment.clone();
    let Some(map) = fragment.as_object_mut() else {
        return fragment;
    };
    for keyword in ["$defs", "$id"] {
        if let Some(value) = root.get(keyword) {
            map.entry(keyword).or_insert_with(|| value.clone());
        }
    }
    fragment
}

// ————————————————————————————————————————————————————————————————————————————
// EXPRESSIONS
// ————————————————————————————————————————————————————————————————————————————

struct ExprStep {
    attr: DynAttr,
}

impl CompileStep for ExprStep {
    fn name(&self) -> &'static str {
        self.attr.keyword()
    }

    fn condition(&self, tree: &SchemaTree, id: NodeId) -> bool {
        let node = tree.node(id);
        node.fragment.get(self.attr.keyword()).is_some() && node.attribute(self.attr).is_none()
    }

    fn apply(&self, tree: &mut SchemaTree, id: NodeId) -> Result<(), StepError> {
        let node = tree.node(id);
        let Some(raw) = node.fragment.get(self.attr.keyword()) else {
            return Ok(());
        };
        let Some(compiled) = CompiledExpr::compile(self.attr.keyword(), &node.pointer, self.attr.kind(), raw) else {
            return Ok(());
        };
        let compiling = node.pointer.clone();

        // dependency edges: referenced node -> compiling node
        for reference in compiled.references() {
            match tree.deref(id, reference) {
                Ok(Some(watched)) => {
                    tree.node_mut(watched).watchers.insert(compiling.clone());
                }
                Ok(None) => tracing::warn!(
                    pointer = %compiling,
                    attribute = self.attr.keyword(),
                    reference = %reference,
                    "backreference does not match any schema node"
                ),
                Err(error) => tracing::warn!(
                    pointer = %compiling,
                    attribute = self.attr.keyword(),
                    reference = %reference,
                    %error,
                    "unable to dereference backreference"
                ),
            }
        }
        tree.node_mut(id).attrs[self.attr.index()] = Some(compiled);
        Ok(())
    }
}
