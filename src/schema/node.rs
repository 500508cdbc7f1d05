//! Compiled schema nodes and the arena that owns them.
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::expr::{CompiledExpr, ResultKind};
use crate::pointer::{Key, Pointer, PointerError};

use super::validate::NodeValidator;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Index of a node inside its [`SchemaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Object,
    Array,
}

/// The twelve reactive attributes a schema node may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynAttr {
    Abstract,
    Hidden,
    Readonly,
    Mandatory,
    Minimized,
    Only,
    Kind,
    Rank,
    Change,
    Expression,
    Init,
    Match,
}

/// One property of an object node in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderEntry {
    pub field: String,
    pub field_index: usize,
    pub tab: Option<Value>,
    pub tab_index: usize,
    pub group: Option<Value>,
    pub group_index: usize,
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub(crate) pointer: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) root: NodeId,
    pub(crate) fragment: Value,
    pub(crate) ty: Option<SchemaType>,
    pub(crate) nullable: bool,
    pub(crate) is_enum: Option<bool>,
    pub(crate) is_enum_array: bool,
    pub(crate) uniform: Option<bool>,
    pub(crate) order: Option<Vec<OrderEntry>>,
    pub(crate) validator: Option<NodeValidator>,
    pub(crate) attrs: [Option<CompiledExpr>; DynAttr::COUNT],
    pub(crate) watchers: IndexSet<String>,
    pub(crate) required: Vec<String>,
    pub(crate) properties: IndexMap<String, NodeId>,
    pub(crate) items: Option<NodeId>,
    pub(crate) one_of: Vec<NodeId>,
    pub(crate) any_of: Vec<NodeId>,
    pub(crate) all_of: Vec<NodeId>,
}

/// Arena holding every node of one compiled schema. Node 0 is the root and
/// nodes are stored in depth-first preorder.
#[derive(Debug, Clone)]
pub struct SchemaTree {
    nodes: Vec<SchemaNode>,
}

// ————————————————————————————————————————————————————————————————————————————
// SMALL TYPES
// ————————————————————————————————————————————————————————————————————————————

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl SchemaType {
    pub fn parse(name: &str) -> Option<SchemaType> {
        Some(match name {
            "string" => SchemaType::String,
            "number" => SchemaType::Number,
            "integer" => SchemaType::Integer,
            "boolean" => SchemaType::Boolean,
            "null" => SchemaType::Null,
            "object" => SchemaType::Object,
            "array" => SchemaType::Array,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
            SchemaType::Object => "object",
            SchemaType::Array => "array",
        }
    }
}

impl DynAttr {
    pub const COUNT: usize = 12;

    pub const ALL: [DynAttr; DynAttr::COUNT] = [
        DynAttr::Abstract,
        DynAttr::Hidden,
        DynAttr::Readonly,
        DynAttr::Mandatory,
        DynAttr::Minimized,
        DynAttr::Only,
        DynAttr::Kind,
        DynAttr::Rank,
        DynAttr::Change,
        DynAttr::Expression,
        DynAttr::Init,
        DynAttr::Match,
    ];

    /// Schema keyword carrying the attribute.
    pub fn keyword(self) -> &'static str {
        match self {
            DynAttr::Abstract => "_abstract",
            DynAttr::Hidden => "_hidden",
            DynAttr::Readonly => "_readonly",
            DynAttr::Mandatory => "_mandatory",
            DynAttr::Minimized => "_minimized",
            DynAttr::Only => "_only",
            DynAttr::Kind => "_kind",
            DynAttr::Rank => "_rank",
            DynAttr::Change => "_change",
            DynAttr::Expression => "_expression",
            DynAttr::Init => "_init",
            DynAttr::Match => "_match",
        }
    }

    pub fn name(self) -> &'static str {
        &self.keyword()[1..]
    }

    pub fn kind(self) -> ResultKind {
        match self {
            DynAttr::Abstract => ResultKind::String,
            DynAttr::Rank | DynAttr::Change | DynAttr::Expression | DynAttr::Init => ResultKind::Any,
            _ => ResultKind::Boolean,
        }
    }

    pub fn from_name(name: &str) -> Option<DynAttr> {
        DynAttr::ALL.into_iter().find(|attr| attr.name() == name || attr.keyword() == name)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NODE
// ————————————————————————————————————————————————————————————————————————————

impl SchemaNode {
    fn new(pointer: String, parent: Option<NodeId>, fragment: Value) -> Self {
        let required = fragment
            .get("required")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        SchemaNode {
            pointer,
            parent,
            root: NodeId::ROOT,
            fragment,
            ty: None,
            nullable: false,
            is_enum: None,
            is_enum_array: false,
            uniform: None,
            order: None,
            validator: None,
            attrs: Default::default(),
            watchers: IndexSet::new(),
            required,
            properties: IndexMap::new(),
            items: None,
            one_of: Vec::new(),
            any_of: Vec::new(),
            all_of: Vec::new(),
        }
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node's own schema document, references already expanded.
    pub fn fragment(&self) -> &Value {
        &self.fragment
    }

    pub fn ty(&self) -> SchemaType {
        self.ty.unwrap_or(SchemaType::String)
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_enum(&self) -> bool {
        self.is_enum.unwrap_or(false)
    }

    pub fn is_enum_array(&self) -> bool {
        self.is_enum_array
    }

    /// `false` only for arrays whose items are a composition.
    pub fn uniform(&self) -> bool {
        self.uniform.unwrap_or(true)
    }

    pub fn order(&self) -> Option<&[OrderEntry]> {
        self.order.as_deref()
    }

    pub fn attribute(&self, attr: DynAttr) -> Option<&CompiledExpr> {
        self.attrs[attr.index()].as_ref()
    }

    pub fn watchers(&self) -> &IndexSet<String> {
        &self.watchers
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn properties(&self) -> &IndexMap<String, NodeId> {
        &self.properties
    }

    pub fn items(&self) -> Option<NodeId> {
        self.items
    }

    pub fn one_of(&self) -> &[NodeId] {
        &self.one_of
    }

    pub fn any_of(&self) -> &[NodeId] {
        &self.any_of
    }

    pub fn all_of(&self) -> &[NodeId] {
        &self.all_of
    }

    /// Every composition alternative, `oneOf` then `anyOf` then `allOf`.
    pub fn compositions(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.one_of.iter().chain(&self.any_of).chain(&self.all_of).copied()
    }

    /// Run the bound validator; nodes without one accept everything.
    pub fn validate(&self, value: &Value) -> bool {
        self.validator.as_ref().is_none_or(|v| v.is_valid(value))
    }

    pub fn validation_errors(&self, value: &Value) -> Vec<String> {
        self.validator.as_ref().map(|v| v.errors(value)).unwrap_or_default()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TREE
// ————————————————————————————————————————————————————————————————————————————

impl SchemaTree {
    /// Lay out `document` as an arena: pointers, parents and children are
    /// wired here, everything else is filled in by the compile passes.
    pub(crate) fn build(document: &Value) -> SchemaTree {
        let mut tree = SchemaTree { nodes: Vec::new() };
        tree.push(document, String::new(), None);
        tree
    }

    fn push(&mut self, fragment: &Value, pointer: String, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SchemaNode::new(pointer.clone(), parent, fragment.clone()));

        if let Some(properties) = fragment.get("properties").and_then(Value::as_object) {
            for (name, child) in properties.iter().filter(|(_, c)| c.is_object()) {
                let child_id = self.push(child, format!("{pointer}/{name}"), Some(id));
                self.nodes[id.0].properties.insert(name.clone(), child_id);
            }
        }
        if let Some(items) = fragment.get("items").filter(|i| i.is_object()) {
            let child_id = self.push(items, format!("{pointer}/*"), Some(id));
            self.nodes[id.0].items = Some(child_id);
        }
        for keyword in ["oneOf", "anyOf", "allOf"] {
            let Some(list) = fragment.get(keyword).and_then(Value::as_array) else {
                continue;
            };
            for (i, child) in list.iter().enumerate().filter(|(_, c)| c.is_object()) {
                let child_id = self.push(child, format!("{pointer}/{keyword}/{i}"), Some(id));
                let node = &mut self.nodes[id.0];
                match keyword {
                    "oneOf" => node.one_of.push(child_id),
                    "anyOf" => node.any_of.push(child_id),
                    _ => node.all_of.push(child_id),
                }
            }
        }
        id
    }

    pub fn root_id(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn root(&self) -> &SchemaNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in depth-first preorder.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SchemaNode> {
        self.nodes.iter()
    }

    /// Dereference `pointer` from node `from`.
    ///
    /// Relative pointers climb parents; `*` (or any key under an array
    /// node) descends into `items`, other keys into `properties`. A missing
    /// descent yields `Ok(None)`, an ascent above the root is an error.
    pub fn deref(&self, from: NodeId, pointer: &str) -> Result<Option<NodeId>, PointerError> {
        let parsed = Pointer::parse(pointer)?;
        let mut current = if parsed.is_relative() { from } else { NodeId::ROOT };
        for _ in 0..parsed.ascend() {
            current = self.node(current).parent.ok_or_else(|| PointerError::Range {
                pointer: pointer.to_string(),
                base: self.node(from).pointer.clone(),
                ascend: parsed.ascend(),
            })?;
        }
        for key in parsed.descend() {
            let node = self.node(current);
            let next = match key {
                Key::Name(name) if name == "*" => node.items,
                _ if node.ty() == SchemaType::Array => node.items,
                _ => node.properties.get(&key.to_name()).copied(),
            };
            match next {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Absolute lookup, `None` for syntax errors and misses alike.
    pub fn get(&self, pointer: &str) -> Option<NodeId> {
        self.deref(NodeId::ROOT, pointer).ok().flatten()
    }

    /// Schema governing `key` under a container governed by `parent`:
    /// array nodes answer with `items`, object nodes with the named
    /// property, anything else is permissive (`None`).
    pub fn child_for(&self, parent: Option<NodeId>, key: &Key) -> Option<NodeId> {
        let node = self.node(parent?);
        match node.ty() {
            SchemaType::Array => node.items,
            SchemaType::Object => node.properties.get(&key.to_name()).copied(),
            _ => None,
        }
    }

    /// JSON rendering of the compiled tree, one entry per node.
    pub fn summary(&self) -> Value {
        let nodes = self
            .nodes
            .iter()
            .map(|node| {
                let mut map = Map::new();
                map.insert("pointer".into(), json!(node.pointer));
                map.insert("type".into(), json!(node.ty().as_str()));
                map.insert("nullable".into(), json!(node.nullable));
                if node.is_enum() {
                    map.insert("enum".into(), Value::Bool(true));
                }
                if node.is_enum_array {
                    map.insert("enumArray".into(), Value::Bool(true));
                }
                if node.ty() == SchemaType::Array {
                    map.insert("uniform".into(), Value::Bool(node.uniform()));
                }
                if let Some(order) = &node.order {
                    let fields = order.iter().map(|entry| Value::String(entry.field.clone())).collect();
                    map.insert("order".into(), Value::Array(fields));
                }
                if !node.required.is_empty() {
                    map.insert("required".into(), json!(node.required));
                }
                if !node.watchers.is_empty() {
                    map.insert("watchers".into(), json!(node.watchers));
                }
                let attributes: Vec<&str> = DynAttr::ALL
                    .into_iter()
                    .filter(|attr| node.attribute(*attr).is_some())
                    .map(DynAttr::name)
                    .collect();
                if !attributes.is_empty() {
                    map.insert("attributes".into(), json!(attributes));
                }
                Value::Object(map)
            })
            .collect();
        Value::Array(nodes)
    }
}
