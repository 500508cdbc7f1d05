//! Data passes run around every write.
//!
//! A [`DataWalker`] visits a value together with its schema node, tries its
//! steps at every position, then descends: object nodes through their
//! schema `properties`, uniform arrays through `items`, and non-uniform
//! arrays through whichever `items` alternatives report a `_match` for the
//! element.
use serde_json::Value;

use crate::expr::eval::truthy;
use crate::schema::{DynAttr, NodeId, SchemaNode, SchemaTree};

use super::pointer::DynPointer;
use super::proxy::LiveValue;

pub(crate) trait DataStep: Sync {
    fn condition(&self, schema: &SchemaNode, pointer: &DynPointer) -> bool;
    fn action(&self, schema: &SchemaNode, pointer: &DynPointer);
}

pub(crate) struct DataWalker {
    name: &'static str,
    steps: &'static [&'static dyn DataStep],
}

/// Applies `_init` where nothing is stored yet and `_expression` always.
pub(crate) static INITIALISER: DataWalker = DataWalker { name: "initialiser", steps: &[&InitStep, &ExprStep] };

/// Runs against an outgoing value before it is overwritten or removed.
pub(crate) static RELEASER: DataWalker = DataWalker { name: "releaser", steps: &[&ReleaseStep] };

impl DataWalker {
    pub(crate) fn apply(&self, tree: &SchemaTree, schema: Option<NodeId>, pointer: &DynPointer) {
        let Some(id) = schema else {
            return;
        };
        let node = tree.node(id);
        for step in self.steps {
            if step.condition(node, pointer) {
                step.action(node, pointer);
            }
        }
        self.apply_children(tree, schema, pointer);
    }

    /// Descend into the value at `pointer` without running steps on it.
    pub(crate) fn apply_children(&self, tree: &SchemaTree, schema: Option<NodeId>, pointer: &DynPointer) {
        let Some(id) = schema else {
            return;
        };
        let node = tree.node(id);
        let Some(LiveValue::Proxy(proxy)) = pointer.live() else {
            return;
        };
        tracing::trace!(walker = self.name, pointer = %pointer, "walking");

        if !proxy.is_array() {
            for (name, child) in node.properties() {
                self.apply(tree, Some(*child), &pointer.child(name));
            }
            return;
        }
        if node.uniform() {
            for index in 0..proxy.len() {
                self.apply(tree, node.items(), &pointer.child(index));
            }
            return;
        }
        let Some(items) = node.items() else {
            return;
        };
        let alternatives: Vec<NodeId> = tree.node(items).compositions().collect();
        for index in 0..proxy.len() {
            let element = pointer.child(index);
            let value = element.value();
            for &alternative in &alternatives {
                let matched = tree
                    .node(alternative)
                    .attribute(DynAttr::Match)
                    .is_some_and(|m| truthy(&m.evaluate(value.as_ref(), &element)));
                if matched {
                    self.apply(tree, Some(alternative), &element);
                }
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// STEPS
// ————————————————————————————————————————————————————————————————————————————

struct InitStep;

impl DataStep for InitStep {
    fn condition(&self, schema: &SchemaNode, pointer: &DynPointer) -> bool {
        schema.attribute(DynAttr::Init).is_some() && pointer.value().is_none()
    }

    fn action(&self, schema: &SchemaNode, pointer: &DynPointer) {
        if let Some(init) = schema.attribute(DynAttr::Init) {
            let value = init.evaluate(None, pointer);
            write(pointer, value, "_init");
        }
    }
}

struct ExprStep;

impl DataStep for ExprStep {
    fn condition(&self, schema: &SchemaNode, _pointer: &DynPointer) -> bool {
        schema.attribute(DynAttr::Expression).is_some()
    }

    fn action(&self, schema: &SchemaNode, pointer: &DynPointer) {
        if let Some(expression) = schema.attribute(DynAttr::Expression) {
            let current = pointer.value();
            let value = expression.evaluate(current.as_ref(), pointer);
            write(pointer, value, "_expression");
        }
    }
}

struct ReleaseStep;

impl DataStep for ReleaseStep {
    fn condition(&self, _schema: &SchemaNode, pointer: &DynPointer) -> bool {
        pointer.value().is_some()
    }

    fn action(&self, _schema: &SchemaNode, pointer: &DynPointer) {
        tracing::trace!(pointer = %pointer, "releasing value");
    }
}

fn write(pointer: &DynPointer, value: Value, attribute: &str) {
    if !pointer.write_raw(value) {
        tracing::debug!(pointer = %pointer, attribute, "computed value has no container to land in");
    }
}
