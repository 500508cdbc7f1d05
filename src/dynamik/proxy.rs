//! Live containers and the proxies that guard them.
//!
//! Every object or array in a live graph is a [`Node`] owning its slots.
//! Primitives are stored in place. A [`DynProxy`] pairs a node with its
//! path and runs the mutation protocol on writes:
//!
//! 1. absorb the write if the target position is read-only
//! 2. look up the child schema under the node's schema
//! 3. release the outgoing value
//! 4. wrap and store the new value
//! 5. initialise the new value (`_init`, `_expression`)
//! 6. notify listeners of the target pointer
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::pointer::Key;
use crate::schema::{NodeId, SchemaTree};

use super::Engine;
use super::data::{INITIALISER, RELEASER};
use super::pointer::DynPointer;

/// How many `null` slots a single write past the end of an array may add.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

// ————————————————————————————————————————————————————————————————————————————
// STORAGE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) schema: Option<NodeId>,
    container: RefCell<Container>,
}

#[derive(Debug)]
enum Container {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Primitive(Value),
    Composite(Rc<Node>),
}

impl Slot {
    /// Deep-wrap `value` under `schema`: containers become nodes,
    /// primitives stay as they are.
    pub(crate) fn wrap(tree: &SchemaTree, schema: Option<NodeId>, value: Value) -> Slot {
        let container = match value {
            Value::Array(items) => Container::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Slot::wrap(tree, tree.child_for(schema, &Key::Index(i)), item))
                    .collect(),
            ),
            Value::Object(map) => Container::Object(
                map.into_iter()
                    .map(|(name, item)| {
                        let child = tree.child_for(schema, &Key::Name(name.clone()));
                        (name, Slot::wrap(tree, child, item))
                    })
                    .collect(),
            ),
            primitive => return Slot::Primitive(primitive),
        };
        Slot::Composite(Rc::new(Node { schema, container: RefCell::new(container) }))
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Slot::Primitive(value) => value.clone(),
            Slot::Composite(node) => node.to_value(),
        }
    }
}

impl Node {
    pub(crate) fn to_value(&self) -> Value {
        match &*self.container.borrow() {
            Container::Object(map) => {
                Value::Object(map.iter().map(|(k, slot)| (k.clone(), slot.to_value())).collect::<Map<_, _>>())
            }
            Container::Array(items) => Value::Array(items.iter().map(Slot::to_value).collect()),
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Option<Slot> {
        match &*self.container.borrow() {
            Container::Object(map) => map.get(&key.to_name()).cloned(),
            Container::Array(items) => key.as_index().and_then(|i| items.get(i)).cloned(),
        }
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        match &*self.container.borrow() {
            Container::Object(map) => map.keys().map(|k| Key::parse(k)).collect(),
            Container::Array(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &*self.container.borrow() {
            Container::Object(map) => map.len(),
            Container::Array(items) => items.len(),
        }
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(&*self.container.borrow(), Container::Array(_))
    }

    /// Objects take any key, arrays only indices no further than
    /// [`MAX_ARRAY_GAP`] past the end.
    pub(crate) fn accepts(&self, key: &Key) -> bool {
        match &*self.container.borrow() {
            Container::Object(_) => true,
            Container::Array(items) => key.as_index().is_some_and(|i| i <= items.len().saturating_add(MAX_ARRAY_GAP)),
        }
    }

    /// Store `slot` under `key`. Writing past the end of an array pads the
    /// gap with `null`.
    pub(crate) fn put(&self, key: &Key, slot: Slot) -> bool {
        match &mut *self.container.borrow_mut() {
            Container::Object(map) => {
                map.insert(key.to_name(), slot);
                true
            }
            Container::Array(items) => match key.as_index() {
                Some(i) if i < items.len() => {
                    items[i] = slot;
                    true
                }
                Some(i) if i <= items.len().saturating_add(MAX_ARRAY_GAP) => {
                    items.resize(i, Slot::Primitive(Value::Null));
                    items.push(slot);
                    true
                }
                _ => false,
            },
        }
    }

    /// Objects drop the key; arrays keep their length and leave `null`.
    fn remove(&self, key: &Key) -> bool {
        match &mut *self.container.borrow_mut() {
            Container::Object(map) => map.shift_remove(&key.to_name()).is_some(),
            Container::Array(items) => match key.as_index().and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = Slot::Primitive(Value::Null);
                    true
                }
                None => false,
            },
        }
    }

    fn pop(&self) -> Option<Slot> {
        match &mut *self.container.borrow_mut() {
            Container::Array(items) => items.pop(),
            Container::Object(_) => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PROXY
// ————————————————————————————————————————————————————————————————————————————

/// A value read from a live graph.
#[derive(Debug, Clone)]
pub enum LiveValue {
    Primitive(Value),
    Proxy(DynProxy),
}

impl LiveValue {
    pub fn to_json(&self) -> Value {
        match self {
            LiveValue::Primitive(value) => value.clone(),
            LiveValue::Proxy(proxy) => proxy.to_json(),
        }
    }

    pub fn as_primitive(&self) -> Option<&Value> {
        match self {
            LiveValue::Primitive(value) => Some(value),
            LiveValue::Proxy(_) => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&DynProxy> {
        match self {
            LiveValue::Proxy(proxy) => Some(proxy),
            LiveValue::Primitive(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct DynProxy {
    engine: Rc<Engine>,
    path: Vec<Key>,
    node: Rc<Node>,
}

impl DynProxy {
    pub(crate) fn new(engine: Rc<Engine>, path: Vec<Key>, node: Rc<Node>) -> Self {
        DynProxy { engine, path, node }
    }

    /// The bound pointer of this container (`$`).
    pub fn pointer(&self) -> DynPointer {
        DynPointer::new(self.engine.clone(), self.path.clone())
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<LiveValue> {
        let key = key.into();
        let slot = self.node.get(&key)?;
        Some(match slot {
            Slot::Primitive(value) => LiveValue::Primitive(value),
            Slot::Composite(node) => {
                let mut path = self.path.clone();
                path.push(key);
                LiveValue::Proxy(DynProxy::new(self.engine.clone(), path, node))
            }
        })
    }

    /// Snapshot of the value under `key`.
    pub fn get_value(&self, key: impl Into<Key>) -> Option<Value> {
        self.node.get(&key.into()).map(|slot| slot.to_value())
    }

    /// Assign `value` under `key`. Returns `false` when nothing was written:
    /// the position is read-only, or `key` cannot address this container.
    pub fn set(&self, key: impl Into<Key>, value: Value) -> bool {
        let key = key.into();
        let pointer = self.pointer().child(key.clone());
        if !self.node.accepts(&key) {
            tracing::debug!(pointer = %pointer, "ignoring write: key does not address a reachable array slot");
            return false;
        }
        if pointer.readonly() {
            tracing::debug!(pointer = %pointer, "write absorbed by read-only policy");
            return false;
        }

        let tree = &self.engine.schema;
        let schema = tree.child_for(self.node.schema, &key);
        let old_value = pointer.value();
        RELEASER.apply(tree, schema, &pointer);
        self.node.put(&key, Slot::wrap(tree, schema, value));
        INITIALISER.apply(tree, schema, &pointer);
        self.engine.notify(&pointer, old_value, pointer.value());
        true
    }

    /// Remove the value under `key` (array slots are set to `null`).
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.node.get(&key).is_none() {
            return false;
        }
        let pointer = self.pointer().child(key.clone());
        if pointer.readonly() {
            tracing::debug!(pointer = %pointer, "delete absorbed by read-only policy");
            return false;
        }

        let tree = &self.engine.schema;
        let old_value = pointer.value();
        RELEASER.apply(tree, tree.child_for(self.node.schema, &key), &pointer);
        self.node.remove(&key);
        self.engine.notify(&pointer, old_value, pointer.value());
        true
    }

    /// Append to an array. `false` on objects.
    pub fn push(&self, value: Value) -> bool {
        self.is_array() && self.set(self.len(), value)
    }

    /// Remove and return the last element of an array.
    pub fn pop(&self) -> Option<Value> {
        let index = self.len().checked_sub(1).filter(|_| self.is_array())?;
        let pointer = self.pointer().child(index);
        if pointer.readonly() {
            tracing::debug!(pointer = %pointer, "pop absorbed by read-only policy");
            return None;
        }
        let tree = &self.engine.schema;
        RELEASER.apply(tree, tree.child_for(self.node.schema, &Key::Index(index)), &pointer);
        let old_value = self.node.pop()?.to_value();
        self.engine.notify(&pointer, Some(old_value.clone()), None);
        Some(old_value)
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        self.node.is_array()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.node.keys()
    }

    pub fn to_json(&self) -> Value {
        self.node.to_value()
    }
}

impl fmt::Debug for DynProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynProxy")
            .field("pointer", &self.pointer().pointer())
            .field("value", &self.to_json())
            .finish()
    }
}
