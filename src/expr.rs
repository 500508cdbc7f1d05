//! Compiled attribute expressions.
//!
//! Every reactive attribute in a schema (`_abstract`, `_readonly`, `_init`,
//! ...) is compiled once into a [`CompiledExpr`] and then evaluated against
//! a live position in the document. How the raw schema value compiles
//! depends on the attribute's [`ResultKind`]:
//!
//! | kind    | raw value          | compiled as                         |
//! |---------|--------------------|-------------------------------------|
//! | string  | string             | template (`${...}` holes)           |
//! | boolean | `true/false/null`  | constant                            |
//! | boolean | string             | expression, result coerced to bool  |
//! | any     | boolean, number    | constant                            |
//! | any     | string             | expression                          |
//! | any     | array of strings   | each line rendered, joined with `\n`|
pub mod eval;
pub mod parser;

use serde_json::Value;

pub use eval::{EvalError, Evaluator, Operand, Target};
pub use parser::{ExprError, parse_expression, parse_template};

use parser::{Expr, Template};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    String,
    Boolean,
    Any,
}

#[derive(Debug, Clone)]
enum Body {
    Constant(Value),
    Template(Template),
    Expression(Expr),
    Lines(Vec<Template>),
}

#[derive(Debug, Clone)]
pub struct CompiledExpr {
    attribute: String,
    pointer: String,
    kind: ResultKind,
    body: Body,
    references: Vec<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ResultKind {
    /// Value used when compilation or evaluation fails.
    pub fn fallback(self) -> Value {
        match self {
            ResultKind::String => Value::String(String::new()),
            ResultKind::Boolean => Value::Bool(true),
            ResultKind::Any => Value::Null,
        }
    }

    fn coerce<T: Target>(self, result: Operand<T>) -> Value {
        match self {
            ResultKind::String => Value::String(result.to_text()),
            ResultKind::Boolean => match result {
                Operand::Json(Value::Null) => Value::Null,
                other => Value::Bool(other.truthy()),
            },
            ResultKind::Any => result.into_value(),
        }
    }
}

impl CompiledExpr {
    pub fn constant(attribute: &str, pointer: &str, kind: ResultKind, value: Value) -> Self {
        CompiledExpr {
            attribute: attribute.to_string(),
            pointer: pointer.to_string(),
            kind,
            body: Body::Constant(value),
            references: Vec::new(),
        }
    }

    /// Compile `raw` for `attribute` at schema `pointer`.
    ///
    /// Returns `None` when the raw value has a shape this kind does not
    /// accept. Parse failures still compile, to a constant holding the
    /// kind's fallback.
    pub fn compile(attribute: &str, pointer: &str, kind: ResultKind, raw: &Value) -> Option<CompiledExpr> {
        let mut references = Vec::new();
        let body = match build(kind, raw, &mut references) {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::warn!(attribute, pointer, raw = %raw, "unsupported attribute value, ignoring");
                return None;
            }
            Err(error) => {
                tracing::warn!(attribute, pointer, %error, "failed to compile expression, using default");
                references.clear();
                Body::Constant(kind.fallback())
            }
        };
        Some(CompiledExpr {
            attribute: attribute.to_string(),
            pointer: pointer.to_string(),
            kind,
            body,
            references,
        })
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    /// Backreference pointers found in the expression, in source order.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.body, Body::Constant(_))
    }

    /// Evaluate with `value` bound to `value` and `this` bound to `$`.
    ///
    /// Never fails: evaluation errors are logged and the kind's fallback
    /// is returned.
    pub fn evaluate<T: Target>(&self, value: Option<&Value>, this: &T) -> Value {
        let evaluator = Evaluator::new(value, this);
        let result = match &self.body {
            Body::Constant(value) => return value.clone(),
            Body::Template(template) => evaluator.render(template).map(Value::String),
            Body::Expression(expr) => evaluator.eval(expr).map(|result| self.kind.coerce(result)),
            Body::Lines(lines) => lines
                .iter()
                .map(|line| evaluator.render(line).map(|text| text + "\n"))
                .collect::<Result<String, _>>()
                .map(Value::String),
        };
        result.unwrap_or_else(|error| {
            tracing::error!(
                attribute = %self.attribute,
                pointer = %self.pointer,
                at = %this.label(),
                %error,
                "expression evaluation failed"
            );
            self.kind.fallback()
        })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn build(kind: ResultKind, raw: &Value, references: &mut Vec<String>) -> Result<Option<Body>, ExprError> {
    let body = match (kind, raw) {
        (ResultKind::Boolean, Value::Bool(_) | Value::Null) | (ResultKind::Any, Value::Bool(_)) => {
            Body::Constant(raw.clone())
        }
        (ResultKind::String, Value::String(src)) => {
            let parsed = parse_template(src)?;
            references.extend(parsed.references);
            Body::Template(parsed.tree)
        }
        (ResultKind::String, Value::Number(_) | Value::Bool(_)) => Body::Constant(Value::String(raw.to_string())),
        (ResultKind::Boolean | ResultKind::Any, Value::String(src)) => {
            let parsed = parse_expression(src)?;
            references.extend(parsed.references);
            Body::Expression(parsed.tree)
        }
        (ResultKind::String | ResultKind::Any, Value::Array(lines)) => {
            let mut templates = Vec::with_capacity(lines.len());
            for line in lines {
                let Some(src) = line.as_str() else {
                    return Ok(None);
                };
                let parsed = parse_template(src)?;
                references.extend(parsed.references);
                templates.push(parsed.tree);
            }
            Body::Lines(templates)
        }
        (ResultKind::Any, Value::Number(_) | Value::Object(_) | Value::Null) => Body::Constant(raw.clone()),
        _ => return Ok(None),
    };
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::PointerError;
    use serde_json::json;

    /// A target with no document behind it.
    #[derive(Clone)]
    struct Nowhere;

    impl Target for Nowhere {
        fn value(&self) -> Option<Value> {
            None
        }
        fn property(&self, _: &str) -> Operand<Self> {
            Operand::Undefined
        }
        fn to(&self, _: &str) -> Result<Self, PointerError> {
            Ok(Nowhere)
        }
        fn assign(&self, _: Value) -> bool {
            false
        }
        fn label(&self) -> String {
            String::new()
        }
    }

    fn compile(kind: ResultKind, raw: Value) -> CompiledExpr {
        CompiledExpr::compile("_test", "/x", kind, &raw).unwrap()
    }

    #[test]
    fn literal_booleans_are_constants() {
        assert!(compile(ResultKind::Boolean, json!(true)).is_constant());
        assert!(compile(ResultKind::Boolean, json!(null)).is_constant());
        assert!(compile(ResultKind::Any, json!(false)).is_constant());
        assert!(!compile(ResultKind::Boolean, json!("value == 1")).is_constant());
    }

    #[test]
    fn boolean_kind_coerces_but_keeps_null() {
        let expr = compile(ResultKind::Boolean, json!("value"));
        assert_eq!(expr.evaluate(Some(&json!("x")), &Nowhere), json!(true));
        assert_eq!(expr.evaluate(Some(&json!(0)), &Nowhere), json!(false));
        assert_eq!(expr.evaluate(Some(&json!(null)), &Nowhere), json!(null));
        assert_eq!(expr.evaluate(None, &Nowhere), json!(false));
    }

    #[test]
    fn string_kind_renders_template() {
        let expr = compile(ResultKind::String, json!("v=${value}"));
        assert_eq!(expr.evaluate(Some(&json!(3)), &Nowhere), json!("v=3"));
        assert_eq!(expr.evaluate(None, &Nowhere), json!("v="));
    }

    #[test]
    fn multiline_any_joins_with_newlines() {
        let expr = compile(ResultKind::Any, json!(["${value.first}", "${value.last}"]));
        let value = json!({"first": "a", "last": "b"});
        assert_eq!(expr.evaluate(Some(&value), &Nowhere), json!("a\nb\n"));
    }

    #[test]
    fn parse_failure_compiles_to_fallback() {
        let expr = compile(ResultKind::Boolean, json!("value +"));
        assert!(expr.is_constant());
        assert_eq!(expr.evaluate(None, &Nowhere), json!(true));
        assert!(expr.references().is_empty());
    }

    #[test]
    fn evaluation_failure_yields_fallback() {
        let expr = compile(ResultKind::Any, json!("value.missing.deeper"));
        assert_eq!(expr.evaluate(Some(&json!({})), &Nowhere), json!(null));
        let expr = compile(ResultKind::String, json!("${value.a.b}"));
        assert_eq!(expr.evaluate(None, &Nowhere), json!(""));
    }

    #[test]
    fn unsupported_shapes_are_ignored() {
        assert!(CompiledExpr::compile("_hidden", "", ResultKind::Boolean, &json!(3)).is_none());
        assert!(CompiledExpr::compile("_abstract", "", ResultKind::String, &json!({"a": 1})).is_none());
    }

    #[test]
    fn references_are_recorded() {
        let expr = compile(ResultKind::Any, json!("_`0/b` + _`1/c`"));
        assert_eq!(expr.references(), ["0/b", "1/c"]);
    }
}
