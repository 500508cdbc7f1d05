//! Bound pointers: a path into a live graph.
//!
//! A [`DynPointer`] does not hold the value it addresses. Every read walks
//! the graph from the root, so a pointer stays meaningful across writes and
//! may address positions that do not exist yet.
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use ordered_float::OrderedFloat;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::expr::eval::{text, truthy};
use crate::expr::{CompiledExpr, Operand, Target};
use crate::pointer::{self, Key, PointerError};
use crate::schema::{DynAttr, NodeId, SchemaNode};

use super::proxy::{DynProxy, LiveValue, Slot};
use super::{Engine, Listener};

#[derive(Clone)]
pub struct DynPointer {
    engine: Rc<Engine>,
    path: Vec<Key>,
}

/// Sort key for [`DynPointer::ranked_children`]: numbers, then strings,
/// then everything without a usable rank.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum RankKey {
    Number(OrderedFloat<f64>),
    Text(String),
    Unranked,
}

impl RankKey {
    fn of(rank: Option<Value>) -> RankKey {
        match rank {
            Some(Value::Number(n)) => n.as_f64().map_or(RankKey::Unranked, |f| RankKey::Number(OrderedFloat(f))),
            Some(Value::String(s)) => RankKey::Text(s),
            _ => RankKey::Unranked,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NAVIGATION
// ————————————————————————————————————————————————————————————————————————————

impl DynPointer {
    pub(crate) fn new(engine: Rc<Engine>, path: Vec<Key>) -> Self {
        DynPointer { engine, path }
    }

    /// Resolve `token` (absolute, or relative to this pointer).
    pub fn to(&self, token: &str) -> Result<DynPointer, PointerError> {
        let path = pointer::resolve(&self.path, token)?;
        Ok(DynPointer::new(self.engine.clone(), path))
    }

    pub fn child(&self, key: impl Into<Key>) -> DynPointer {
        let mut path = self.path.clone();
        path.push(key.into());
        DynPointer::new(self.engine.clone(), path)
    }

    /// `None` at the root.
    pub fn parent(&self) -> Option<DynPointer> {
        let (_, parent) = self.path.split_last()?;
        Some(DynPointer::new(self.engine.clone(), parent.to_vec()))
    }

    pub fn root(&self) -> DynPointer {
        DynPointer::new(self.engine.clone(), Vec::new())
    }

    pub fn key(&self) -> Option<&Key> {
        self.path.last()
    }

    pub fn path(&self) -> &[Key] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Canonical string form, `""` for the root.
    pub fn pointer(&self) -> String {
        pointer::path_to_string(&self.path)
    }

    pub fn context(&self) -> &Value {
        &self.engine.context
    }

    /// Pointers to the values currently stored under this one.
    pub fn children(&self) -> Vec<DynPointer> {
        match self.live() {
            Some(LiveValue::Proxy(proxy)) => proxy.keys().into_iter().map(|key| self.child(key)).collect(),
            _ => Vec::new(),
        }
    }

    /// Children ordered by their `rank`, stable among equal ranks.
    pub fn ranked_children(&self) -> Vec<DynPointer> {
        let mut ranked: Vec<(RankKey, usize, DynPointer)> = self
            .children()
            .into_iter()
            .enumerate()
            .map(|(index, child)| (RankKey::of(child.rank()), index, child))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().map(|(_, _, child)| child).collect()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALUES
// ————————————————————————————————————————————————————————————————————————————

impl DynPointer {
    /// Snapshot of the addressed value, `None` when absent.
    pub fn value(&self) -> Option<Value> {
        self.engine.slot_at(&self.path).map(|slot| slot.to_value())
    }

    /// The addressed value as stored: primitives by value, containers as
    /// proxies.
    pub fn live(&self) -> Option<LiveValue> {
        match self.engine.slot_at(&self.path)? {
            Slot::Primitive(value) => Some(LiveValue::Primitive(value)),
            Slot::Composite(node) => Some(LiveValue::Proxy(DynProxy::new(self.engine.clone(), self.path.clone(), node))),
        }
    }

    /// Write through the parent container, with the same policy as
    /// [`DynProxy::set`]. The root cannot be replaced.
    pub fn set_value(&self, value: Value) -> bool {
        match self.parent_proxy() {
            Some((proxy, key)) => proxy.set(key, value),
            None => false,
        }
    }

    /// Remove the addressed value through its parent container.
    pub fn delete(&self) -> bool {
        match self.parent_proxy() {
            Some((proxy, key)) => proxy.delete(key),
            None => false,
        }
    }

    /// Store without policy checks or change events.
    pub(crate) fn write_raw(&self, value: Value) -> bool {
        let Some((key, parent_path)) = self.path.split_last() else {
            return false;
        };
        let Some(parent) = self.engine.node_at(parent_path) else {
            return false;
        };
        if !parent.accepts(key) {
            return false;
        }
        let schema = self.engine.schema.child_for(parent.schema, key);
        parent.put(key, Slot::wrap(&self.engine.schema, schema, value))
    }

    fn parent_proxy(&self) -> Option<(DynProxy, Key)> {
        let (key, parent_path) = self.path.split_last()?;
        let node = self.engine.node_at(parent_path)?;
        Some((DynProxy::new(self.engine.clone(), parent_path.to_vec(), node), key.clone()))
    }

    /// `object|array|number|string|boolean|null|undefined`.
    pub fn type_name(&self) -> &'static str {
        match self.value() {
            None => "undefined",
            Some(Value::Null) => "null",
            Some(Value::Bool(_)) => "boolean",
            Some(Value::Number(_)) => "number",
            Some(Value::String(_)) => "string",
            Some(Value::Array(_)) => "array",
            Some(Value::Object(_)) => "object",
        }
    }

    /// Read another position, the `` _`pointer` `` form.
    pub fn tag(&self, token: &str) -> Result<Option<Value>, PointerError> {
        Ok(self.to(token)?.value())
    }

    /// Write another position, the `` _`pointer${value}` `` form.
    pub fn tag_set(&self, token: &str, value: Value) -> Result<bool, PointerError> {
        Ok(self.to(token)?.set_value(value))
    }

    pub fn watch(&self, token: &str, listener: Listener) -> Result<(), PointerError> {
        let target = self.to(token)?;
        self.engine.add_listener(target.pointer(), listener);
        Ok(())
    }

    pub fn unwatch(&self, token: &str, listener: &Listener) -> Result<bool, PointerError> {
        let target = self.to(token)?;
        Ok(self.engine.remove_listener(&target.pointer(), listener))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA & DERIVED ATTRIBUTES
// ————————————————————————————————————————————————————————————————————————————

impl DynPointer {
    /// Schema node governing this position, walked in lockstep with the
    /// path. `None` means no policy.
    pub fn schema(&self) -> Option<NodeId> {
        let tree = &self.engine.schema;
        self.path
            .iter()
            .try_fold(tree.root_id(), |schema, key| tree.child_for(Some(schema), key))
    }

    pub fn schema_node(&self) -> Option<&SchemaNode> {
        self.schema().map(|id| self.engine.schema.node(id))
    }

    fn compiled(&self, attr: DynAttr) -> Option<&CompiledExpr> {
        self.schema_node()?.attribute(attr)
    }

    /// Raw result of the attribute's compiled expression, `None` if the
    /// schema does not define it.
    pub fn attribute(&self, attr: DynAttr) -> Option<Value> {
        let compiled = self.compiled(attr)?;
        let value = self.value();
        Some(compiled.evaluate(value.as_ref(), self))
    }

    fn flag(&self, attr: DynAttr, default: bool) -> bool {
        self.attribute(attr).map_or(default, |v| truthy(&v))
    }

    /// Short text for the value: the `_abstract` template if defined,
    /// otherwise the value itself, children's abstracts joined for
    /// containers.
    pub fn abstract_text(&self) -> String {
        if let Some(result) = self.attribute(DynAttr::Abstract) {
            return text(&result);
        }
        let config = &self.engine.config;
        match self.live() {
            None | Some(LiveValue::Primitive(Value::Null)) => config.null_placeholder.clone(),
            Some(LiveValue::Primitive(value)) => text(&value),
            Some(LiveValue::Proxy(proxy)) => proxy
                .keys()
                .into_iter()
                .map(|key| self.child(key).abstract_text())
                .collect::<Vec<_>>()
                .join(&config.abstract_separator),
        }
    }

    pub fn hidden(&self) -> bool {
        self.flag(DynAttr::Hidden, false)
    }

    pub fn readonly(&self) -> bool {
        self.flag(DynAttr::Readonly, false)
    }

    /// Listed in the parent schema's `required`, or flagged by `_mandatory`.
    pub fn mandatory(&self) -> bool {
        let required = match (self.parent(), self.key()) {
            (Some(parent), Some(key)) => parent.schema_node().is_some_and(|node| node.is_required(&key.to_name())),
            _ => false,
        };
        required || self.flag(DynAttr::Mandatory, false)
    }

    pub fn minimized(&self) -> bool {
        self.flag(DynAttr::Minimized, false)
    }

    pub fn only(&self) -> bool {
        self.flag(DynAttr::Only, true)
    }

    pub fn kind(&self) -> bool {
        self.flag(DynAttr::Kind, true)
    }

    pub fn rank(&self) -> Option<Value> {
        self.attribute(DynAttr::Rank)
    }

    pub fn change(&self) -> Option<Value> {
        self.attribute(DynAttr::Change)
    }

    pub fn expression(&self) -> Option<Value> {
        self.attribute(DynAttr::Expression)
    }

    pub fn init(&self) -> Option<Value> {
        self.attribute(DynAttr::Init)
    }

    pub fn match_value(&self) -> Option<Value> {
        self.attribute(DynAttr::Match)
    }

    /// Check the current value against the schema's validator. Absent
    /// values and positions without schema pass.
    pub fn validate(&self) -> bool {
        match (self.schema_node(), self.value()) {
            (Some(node), Some(value)) => node.validate(&value),
            _ => true,
        }
    }

    pub fn validation_errors(&self) -> Vec<String> {
        match (self.schema_node(), self.value()) {
            (Some(node), Some(value)) => node.validation_errors(&value),
            _ => Vec::new(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TRAITS
// ————————————————————————————————————————————————————————————————————————————

impl Target for DynPointer {
    fn value(&self) -> Option<Value> {
        DynPointer::value(self)
    }

    fn property(&self, name: &str) -> Operand<Self> {
        let json = |v: Value| Operand::Json(v);
        match name {
            "key" => match self.key() {
                Some(Key::Index(i)) => json(Value::from(*i)),
                Some(Key::Name(name)) => json(Value::String(name.clone())),
                None => Operand::Undefined,
            },
            "pointer" => json(Value::String(self.pointer())),
            "value" => Operand::from_option(DynPointer::value(self)),
            "parent" => self.parent().map_or(Operand::Undefined, Operand::Target),
            "root" => Operand::Target(self.root()),
            "context" => json(self.context().clone()),
            "type" => json(Value::String(self.type_name().to_string())),
            "abstract" => json(Value::String(self.abstract_text())),
            "hidden" => json(Value::Bool(self.hidden())),
            "readonly" => json(Value::Bool(self.readonly())),
            "mandatory" => json(Value::Bool(self.mandatory())),
            "minimized" => json(Value::Bool(self.minimized())),
            "only" => json(Value::Bool(self.only())),
            "kind" => json(Value::Bool(self.kind())),
            _ => Operand::Undefined,
        }
    }

    fn to(&self, pointer: &str) -> Result<Self, PointerError> {
        DynPointer::to(self, pointer)
    }

    fn assign(&self, value: Value) -> bool {
        self.set_value(value)
    }

    fn label(&self) -> String {
        self.pointer()
    }
}

impl PartialEq for DynPointer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.engine, &other.engine) && self.path == other.path
    }
}

impl PartialOrd for DynPointer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Rc::ptr_eq(&self.engine, &other.engine).then(|| self.path.cmp(&other.path))
    }
}

impl fmt::Display for DynPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pointer())
    }
}

impl fmt::Debug for DynPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DynPointer({:?})", self.pointer())
    }
}

impl Serialize for DynPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pointer())
    }
}
