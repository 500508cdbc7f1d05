//! Schema compiler pipeline.
//!
//! ```text
//! raw document ──meta check──▶ deep copy ──$ref expansion──▶ arena layout
//!     ──pass 1 (type, enum, uniform, order)──▶ pass 2 (validator, 12 × expr)
//!     ──▶ SchemaTree
//! ```
//!
//! The compiled [`SchemaTree`] is immutable afterwards and is shared by every
//! live graph built on top of it.
pub mod defs;
pub mod node;
pub mod steps;
pub mod validate;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::EngineConfig;

pub use node::{DynAttr, NodeId, OrderEntry, SchemaNode, SchemaTree, SchemaType};
pub use validate::{NodeValidator, ValidationEngine};

// ————————————————————————————————————————————————————————————————————————————
// ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("schema is not valid => {0}")]
    SchemaValidation(String),
    #[error("compile error at \"{pointer}\" during {step}: {source}")]
    Step {
        pointer: String,
        step: &'static str,
        #[source]
        source: StepError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("multiple types not implemented: {0:?}")]
    UnsupportedUnion(Vec<String>),
    #[error("One type must be 'null' in {0:?}")]
    MissingNullInUnion(Vec<String>),
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("Definition not found for {0}")]
    DefinitionNotFound(String),
    #[error("recursive definition {0}")]
    RecursiveDefinition(String),
    #[error("validator compilation failed: {0}")]
    Validator(String),
}

impl CompileError {
    pub(crate) fn step(pointer: &str, step: &'static str, source: StepError) -> CompileError {
        tracing::error!(pointer, step, error = %source, "compile error");
        CompileError::Step { pointer: pointer.to_string(), step, source }
    }

    /// The underlying step error, if any.
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            CompileError::Step { source, .. } => Some(source),
            CompileError::SchemaValidation(_) => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COMPILER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub struct SchemaCompiler {
    document: Value,
    engine: ValidationEngine,
}

impl SchemaCompiler {
    /// Meta-check `schema` with a default engine and take a private copy.
    pub fn new(schema: &Value) -> Result<Self, CompileError> {
        Self::with_engine(schema, ValidationEngine::new())
    }

    pub fn with_engine(schema: &Value, engine: ValidationEngine) -> Result<Self, CompileError> {
        engine.check_schema(schema).map_err(CompileError::SchemaValidation)?;
        Ok(Self::unchecked(schema, engine))
    }

    /// Compiler set up the way `config` asks: meta check on or off, `format`
    /// assertions on or off.
    pub fn from_config(schema: &Value, config: &EngineConfig) -> Result<Self, CompileError> {
        let engine = ValidationEngine::new().with_format_validation(config.validate_formats);
        if config.meta_validation {
            Self::with_engine(schema, engine)
        } else {
            Ok(Self::unchecked(schema, engine))
        }
    }

    /// Skip the meta-schema check. Anything but an object compiles as the
    /// empty, accept-all schema.
    pub fn unchecked(schema: &Value, engine: ValidationEngine) -> Self {
        let document = match schema {
            Value::Object(_) => schema.clone(),
            _ => Value::Object(Map::new()),
        };
        SchemaCompiler { document, engine }
    }

    pub fn compile(mut self) -> Result<SchemaTree, CompileError> {
        defs::resolve_references(&mut self.document)?;
        let mut tree = SchemaTree::build(&self.document);

        for (number, pass) in steps::passes(&self.engine).iter().enumerate() {
            tracing::trace!(pass = number + 1, nodes = tree.len(), "running compile pass");
            for id in tree.ids() {
                for step in pass {
                    if !step.condition(&tree, id) {
                        continue;
                    }
                    if let Err(source) = step.apply(&mut tree, id) {
                        return Err(CompileError::step(tree.node(id).pointer(), step.name(), source));
                    }
                }
            }
        }
        Ok(tree)
    }
}

/// Meta-check and compile in one call.
pub fn compile(schema: &Value) -> Result<SchemaTree, CompileError> {
    SchemaCompiler::new(schema)?.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nullable_pair_compiles() {
        let tree = compile(&json!({
            "type": "object",
            "properties": { "a": { "type": ["string", "null"] } }
        }))
        .unwrap();
        let a = tree.node(tree.get("/a").unwrap());
        assert_eq!(a.ty(), SchemaType::String);
        assert!(a.nullable());
        assert!(a.validate(&json!("x")));
        assert!(a.validate(&json!(null)));
        assert!(!a.validate(&json!(1)));
    }

    #[test]
    fn absent_type_defaults_to_string() {
        let tree = compile(&json!({})).unwrap();
        assert_eq!(tree.root().ty(), SchemaType::String);
        assert!(!tree.root().nullable());
    }

    #[test]
    fn non_object_schema_accepts_anything() {
        let tree = compile(&json!(true)).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.root().validate(&json!({"any": [1, 2]})));
    }

    #[test]
    fn union_errors_name_step_and_pointer() {
        let err = compile(&json!({
            "type": "object",
            "properties": { "x": { "type": ["string", "integer"] } }
        }))
        .unwrap_err();
        match err {
            CompileError::Step { pointer, step, source } => {
                assert_eq!(pointer, "/x");
                assert_eq!(step, "type normalization");
                assert!(source.to_string().contains("One type must be 'null'"));
            }
            other => panic!("unexpected {other}"),
        }

        let err = compile(&json!({ "type": ["string", "integer", "null"] })).unwrap_err();
        assert!(matches!(err.step_error(), Some(StepError::UnsupportedUnion(_))));
    }

    #[test]
    fn meta_check_failure() {
        let err = SchemaCompiler::new(&json!({ "type": "dummy" })).unwrap_err();
        assert!(matches!(err, CompileError::SchemaValidation(_)));
    }

    #[test]
    fn order_pulls_grouped_fields_together() {
        let tree = compile(&json!({
            "type": "object",
            "properties": {
                "a": { "_group": "g1" },
                "b": {},
                "c": { "_group": "g1" },
                "d": { "_tab": "t" },
                "e": {},
                "f": { "_tab": "t" }
            }
        }))
        .unwrap();
        let order: Vec<&str> = tree.root().order().unwrap().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(order, ["a", "c", "b", "d", "f", "e"]);
    }
}
