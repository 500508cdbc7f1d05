//! Handle on the JSON Schema validation engine.
//!
//! Each compiler owns one [`ValidationEngine`]. It checks raw documents
//! against the draft 2020-12 meta-schema and compiles one predicate per
//! schema node. jsonschema ignores keywords it does not know, so the
//! reactive `_`-prefixed ones never take part in validation; the handle only
//! keeps a list of them for lookups.
use std::sync::Arc;

use jsonschema::{Draft, Validator};
use serde_json::Value;

/// Keywords owned by this crate rather than by JSON Schema. Not registered
/// with jsonschema.
pub const RESERVED_VOCABULARY: [&str; 14] = [
    "_abstract",
    "_hidden",
    "_readonly",
    "_mandatory",
    "_minimized",
    "_only",
    "_kind",
    "_rank",
    "_change",
    "_expression",
    "_init",
    "_match",
    "_tab",
    "_group",
];

#[derive(Debug, Clone)]
pub struct ValidationEngine {
    draft: Draft,
    validate_formats: bool,
    vocabulary: Vec<&'static str>,
}

/// Compiled validation predicate for one schema node.
#[derive(Debug, Clone)]
pub struct NodeValidator(Arc<Validator>);

impl Default for ValidationEngine {
    fn default() -> Self {
        ValidationEngine::new()
    }
}

impl ValidationEngine {
    pub fn new() -> Self {
        ValidationEngine {
            draft: Draft::Draft202012,
            validate_formats: false,
            vocabulary: RESERVED_VOCABULARY.to_vec(),
        }
    }

    /// Also enforce `format` assertions in compiled validators.
    pub fn with_format_validation(mut self, enabled: bool) -> Self {
        self.validate_formats = enabled;
        self
    }

    pub fn vocabulary(&self) -> &[&'static str] {
        &self.vocabulary
    }

    pub fn is_reserved(&self, keyword: &str) -> bool {
        self.vocabulary.iter().any(|reserved| *reserved == keyword)
    }

    /// Meta-schema conformance of a raw document.
    pub fn check_schema(&self, schema: &Value) -> Result<(), String> {
        jsonschema::meta::validate(schema).map_err(|e| e.to_string())
    }

    pub fn compile(&self, fragment: &Value) -> Result<NodeValidator, String> {
        jsonschema::options()
            .with_draft(self.draft)
            .should_validate_formats(self.validate_formats)
            .build(fragment)
            .map(|validator| NodeValidator(Arc::new(validator)))
            .map_err(|e| e.to_string())
    }
}

impl NodeValidator {
    pub fn is_valid(&self, value: &Value) -> bool {
        self.0.is_valid(value)
    }

    pub fn errors(&self, value: &Value) -> Vec<String> {
        self.0.iter_errors(value).map(|e| e.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_check_rejects_unknown_type() {
        let engine = ValidationEngine::new();
        assert!(engine.check_schema(&json!({"type": "dummy"})).is_err());
        assert!(engine.check_schema(&json!({"type": "string", "_readonly": "true"})).is_ok());
    }

    #[test]
    fn compiled_validator_ignores_reserved_keywords() {
        let engine = ValidationEngine::new();
        let validator = engine
            .compile(&json!({"type": ["string", "null"], "_abstract": "${value}"}))
            .unwrap();
        assert!(validator.is_valid(&json!("x")));
        assert!(validator.is_valid(&json!(null)));
        assert!(!validator.is_valid(&json!(1)));
        assert_eq!(validator.errors(&json!(1)).len(), 1);
        assert!(engine.is_reserved("_tab"));
    }
}
