//! Reactive data engine.
//!
//! A [`Dynamik`] owns a live JSON graph laid over a compiled [`SchemaTree`].
//! Reads go through [`DynProxy`] and [`DynPointer`]; writes run the
//! mutation protocol (read-only policy, release, init, change events).
//!
//! ```text
//! Dynamik ──▶ Engine { schema, root: Node, context, config, listeners }
//!                         │
//!          DynProxy ──────┤  (path + node, runs set/delete/push/pop)
//!          DynPointer ────┘  (path only, walks from the root on every read)
//! ```
pub mod data;
pub mod pointer;
pub mod proxy;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::pointer::{Key, PointerError};
use crate::schema::{CompileError, SchemaCompiler, SchemaTree};

pub use pointer::DynPointer;
pub use proxy::{DynProxy, LiveValue};

use data::INITIALISER;
use proxy::{Node, Slot};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error)]
pub enum DynamikError {
    #[error("{0}")]
    PrimitiveRoot(&'static str),
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Callback registered with [`Dynamik::watch`]. Identity (the `Rc`
/// allocation) is what [`Dynamik::unwatch`] matches on.
pub type Listener = Rc<dyn Fn(&ChangeEvent)>;

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub pointer: DynPointer,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub(crate) struct Engine {
    pub(crate) schema: Arc<SchemaTree>,
    pub(crate) root: Rc<Node>,
    pub(crate) context: Value,
    pub(crate) config: EngineConfig,
    listeners: RefCell<HashMap<String, Vec<Listener>>>,
}

// ————————————————————————————————————————————————————————————————————————————
// ENGINE
// ————————————————————————————————————————————————————————————————————————————

impl Engine {
    pub(crate) fn slot_at(&self, path: &[Key]) -> Option<Slot> {
        path.iter().try_fold(Slot::Composite(self.root.clone()), |slot, key| match slot {
            Slot::Composite(node) => node.get(key),
            Slot::Primitive(_) => None,
        })
    }

    pub(crate) fn node_at(&self, path: &[Key]) -> Option<Rc<Node>> {
        match self.slot_at(path)? {
            Slot::Composite(node) => Some(node),
            Slot::Primitive(_) => None,
        }
    }

    pub(crate) fn notify(&self, pointer: &DynPointer, old_value: Option<Value>, new_value: Option<Value>) {
        let key = pointer.pointer();
        let listeners = match self.listeners.borrow().get(&key) {
            Some(listeners) if !listeners.is_empty() => listeners.clone(),
            _ => return,
        };
        tracing::trace!(pointer = %key, listeners = listeners.len(), "change");
        let event = ChangeEvent { pointer: pointer.clone(), old_value, new_value };
        for listener in listeners {
            listener(&event);
        }
    }

    pub(crate) fn add_listener(&self, pointer: String, listener: Listener) {
        self.listeners.borrow_mut().entry(pointer).or_default().push(listener);
    }

    pub(crate) fn remove_listener(&self, pointer: &str, listener: &Listener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(registered) = listeners.get_mut(pointer) else {
            return false;
        };
        let Some(position) = registered.iter().position(|l| std::ptr::addr_eq(Rc::as_ptr(l), Rc::as_ptr(listener)))
        else {
            return false;
        };
        registered.remove(position);
        if registered.is_empty() {
            listeners.remove(pointer);
        }
        true
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("schema_nodes", &self.schema.len())
            .field("context", &self.context)
            .field("config", &self.config)
            .field("watched", &self.listeners.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DYNAMIK
// ————————————————————————————————————————————————————————————————————————————

/// A live graph built from a JSON value and a schema.
#[derive(Debug, Clone)]
pub struct Dynamik {
    engine: Rc<Engine>,
}

impl Dynamik {
    /// Compile `schema` and wrap `value` with a default configuration.
    pub fn new(value: Value, schema: &Value) -> Result<Dynamik, DynamikError> {
        Dynamik::builder().schema(schema.clone()).build(value)
    }

    pub fn from_json_str(data: &str, schema: &str) -> Result<Dynamik, DynamikError> {
        let value: Value = serde_json::from_str(data)?;
        let schema: Value = serde_json::from_str(schema)?;
        Dynamik::new(value, &schema)
    }

    pub fn builder() -> DynamikBuilder {
        DynamikBuilder::default()
    }

    /// Proxy over the root container.
    pub fn root(&self) -> DynProxy {
        DynProxy::new(self.engine.clone(), Vec::new(), self.engine.root.clone())
    }

    pub fn pointer(&self) -> DynPointer {
        DynPointer::new(self.engine.clone(), Vec::new())
    }

    /// Bound pointer for an absolute pointer string.
    pub fn at(&self, token: &str) -> Result<DynPointer, PointerError> {
        self.pointer().to(token)
    }

    pub fn schema(&self) -> &SchemaTree {
        &self.engine.schema
    }

    /// Shared handle to the compiled tree, for building sibling graphs.
    pub fn schema_tree(&self) -> Arc<SchemaTree> {
        self.engine.schema.clone()
    }

    pub fn context(&self) -> &Value {
        &self.engine.context
    }

    pub fn to_json(&self) -> Value {
        self.engine.root.to_value()
    }

    pub fn watch(&self, token: &str, listener: Listener) -> Result<(), PointerError> {
        self.pointer().watch(token, listener)
    }

    pub fn unwatch(&self, token: &str, listener: &Listener) -> Result<bool, PointerError> {
        self.pointer().unwatch(token, listener)
    }
}

#[derive(Debug, Default)]
pub struct DynamikBuilder {
    schema: Option<Value>,
    tree: Option<Arc<SchemaTree>>,
    context: Value,
    config: EngineConfig,
}

impl DynamikBuilder {
    /// Raw schema, compiled on [`build`](Self::build).
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Reuse an already compiled tree. Takes precedence over
    /// [`schema`](Self::schema).
    pub fn tree(mut self, tree: Arc<SchemaTree>) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self, value: Value) -> Result<Dynamik, DynamikError> {
        if !(value.is_object() || value.is_array()) {
            return Err(DynamikError::PrimitiveRoot("Dynamik root must be array | object"));
        }
        let tree = match self.tree {
            Some(tree) => tree,
            None => {
                let schema = self.schema.unwrap_or(Value::Bool(true));
                Arc::new(SchemaCompiler::from_config(&schema, &self.config)?.compile()?)
            }
        };

        let root_schema = Some(tree.root_id());
        let Slot::Composite(root) = Slot::wrap(&tree, root_schema, value) else {
            return Err(DynamikError::PrimitiveRoot("Dynamik root must be array | object"));
        };
        let engine = Rc::new(Engine {
            schema: tree,
            root,
            context: self.context,
            config: self.config,
            listeners: RefCell::new(HashMap::new()),
        });

        let dynamik = Dynamik { engine };
        INITIALISER.apply_children(&dynamik.engine.schema, root_schema, &dynamik.pointer());
        Ok(dynamik)
    }
}
