//! Tree-walking evaluation with JavaScript-like value semantics.
//!
//! Operands are plain JSON values, `undefined`, or a *target*: a pointer
//! bound to a live document that expressions can navigate (`$.to(...)`,
//! `$.key`) and write through (`` _`p${v}` ``).
use serde_json::{Number, Value};
use thiserror::Error;

use crate::pointer::PointerError;

use super::parser::{BinaryOp, Expr, LogicalOp, Segment, Template, UnaryOp};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// What an expression sees as `$`.
pub trait Target: Clone {
    /// Snapshot of the addressed value, `None` when absent.
    fn value(&self) -> Option<Value>;
    /// Named property on the target itself (`$.key`, `$.context`, ...).
    fn property(&self, name: &str) -> Operand<Self>;
    /// Navigate by pointer token, relative to this target.
    fn to(&self, pointer: &str) -> Result<Self, PointerError>;
    /// Write through the document's normal write path.
    fn assign(&self, value: Value) -> bool;
    /// Display form, also used for string conversion.
    fn label(&self) -> String;
}

#[derive(Debug, Clone)]
pub enum Operand<T> {
    Undefined,
    Json(Value),
    Target(T),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Pointer(#[from] PointerError),
    #[error("cannot read property '{property}' of {on}")]
    NoProperties { property: String, on: &'static str },
    #[error("'{method}' is not a method of {on}")]
    UnsupportedMethod { method: String, on: &'static str },
}

// ————————————————————————————————————————————————————————————————————————————
// OPERAND
// ————————————————————————————————————————————————————————————————————————————

impl<T: Target> Operand<T> {
    pub fn from_option(value: Option<Value>) -> Self {
        value.map_or(Operand::Undefined, Operand::Json)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Undefined => "undefined",
            Operand::Json(Value::Null) => "null",
            Operand::Json(Value::Bool(_)) => "boolean",
            Operand::Json(Value::Number(_)) => "number",
            Operand::Json(Value::String(_)) => "string",
            Operand::Json(Value::Array(_)) => "array",
            Operand::Json(Value::Object(_)) => "object",
            Operand::Target(_) => "pointer",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Operand::Undefined | Operand::Json(Value::Null))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Operand::Undefined => false,
            Operand::Json(value) => truthy(value),
            Operand::Target(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Operand::Undefined | Operand::Target(_) => f64::NAN,
            Operand::Json(Value::Null) => 0.0,
            Operand::Json(Value::Bool(b)) => f64::from(u8::from(*b)),
            Operand::Json(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Operand::Json(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Operand::Json(Value::Array(_) | Value::Object(_)) => f64::NAN,
        }
    }

    /// String conversion; `undefined` and `null` render as nothing.
    pub fn to_text(&self) -> String {
        match self {
            Operand::Undefined => String::new(),
            Operand::Json(value) => text(value),
            Operand::Target(target) => target.label(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Operand::Undefined => Value::Null,
            Operand::Json(value) => value,
            Operand::Target(target) => target.value().unwrap_or(Value::Null),
        }
    }

    fn concatenates(&self) -> bool {
        matches!(
            self,
            Operand::Target(_) | Operand::Json(Value::String(_) | Value::Array(_) | Value::Object(_))
        )
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// JSON number for `f`, integral values normalised to integers.
pub(crate) fn number(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// EVALUATOR
// ————————————————————————————————————————————————————————————————————————————

pub struct Evaluator<'a, T> {
    value: Option<&'a Value>,
    this: &'a T,
}

impl<'a, T: Target> Evaluator<'a, T> {
    pub fn new(value: Option<&'a Value>, this: &'a T) -> Self {
        Evaluator { value, this }
    }

    pub fn render(&self, template: &Template) -> Result<String, EvalError> {
        let mut out = String::new();
        for part in &template.parts {
            match part {
                Segment::Text(text) => out.push_str(text),
                Segment::Hole(expr) => out.push_str(&self.eval(expr)?.to_text()),
            }
        }
        Ok(out)
    }

    pub fn eval(&self, expr: &Expr) -> Result<Operand<T>, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(Operand::Json(value.clone())),
            Expr::Undefined => Ok(Operand::Undefined),
            Expr::Value => Ok(Operand::from_option(self.value.cloned())),
            Expr::This => Ok(Operand::Target(self.this.clone())),
            Expr::Tag { pointer, assign } => {
                let target = self.this.to(pointer)?;
                match assign {
                    None => Ok(Operand::from_option(target.value())),
                    Some(expr) => {
                        let value = self.eval(expr)?.into_value();
                        target.assign(value.clone());
                        Ok(Operand::Json(value))
                    }
                }
            }
            Expr::Template(template) => Ok(Operand::Json(Value::String(self.render(template)?))),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item).map(Operand::into_value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Operand::Json(Value::Array(values)))
            }
            Expr::Member { object, property } => member(self.eval(object)?, property),
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                index_of(object, &index)
            }
            Expr::Call { object, method, args } => {
                let object = self.eval(object)?;
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>, _>>()?;
                call(object, method, &args)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                Ok(Operand::Json(match op {
                    UnaryOp::Not => Value::Bool(!operand.truthy()),
                    UnaryOp::Neg => number(-operand.to_number()),
                    UnaryOp::Plus => number(operand.to_number()),
                }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(Operand::Json(binary(*op, &left, &right)))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit { Ok(left) } else { self.eval(right) }
            }
            Expr::Conditional { test, consequent, alternate } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn member<T: Target>(object: Operand<T>, name: &str) -> Result<Operand<T>, EvalError> {
    if object.is_nullish() {
        return Err(EvalError::NoProperties { property: name.to_string(), on: object.kind() });
    }
    Ok(match object {
        Operand::Target(target) => target.property(name),
        Operand::Json(Value::Object(map)) => Operand::from_option(map.get(name).cloned()),
        Operand::Json(Value::Array(items)) if name == "length" => Operand::Json(Value::from(items.len())),
        Operand::Json(Value::String(s)) if name == "length" => Operand::Json(Value::from(s.chars().count())),
        _ => Operand::Undefined,
    })
}

fn index_of<T: Target>(object: Operand<T>, index: &Operand<T>) -> Result<Operand<T>, EvalError> {
    let key = index.to_text();
    if object.is_nullish() {
        return Err(EvalError::NoProperties { property: key, on: object.kind() });
    }
    Ok(match object {
        Operand::Target(target) => Operand::Target(target.to(&format!("0/{key}"))?),
        Operand::Json(Value::Object(map)) => Operand::from_option(map.get(&key).cloned()),
        Operand::Json(Value::Array(items)) => {
            Operand::from_option(key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()))
        }
        Operand::Json(Value::String(s)) => Operand::from_option(
            key.parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string())),
        ),
        _ => Operand::Undefined,
    })
}

fn call<T: Target>(object: Operand<T>, method: &str, args: &[Operand<T>]) -> Result<Operand<T>, EvalError> {
    let arg_text = |i: usize| args.get(i).map(Operand::to_text).unwrap_or_default();
    let unsupported = |on| EvalError::UnsupportedMethod { method: method.to_string(), on };
    match &object {
        Operand::Target(target) => match method {
            "to" => Ok(Operand::Target(target.to(&arg_text(0))?)),
            _ => Err(unsupported("pointer")),
        },
        Operand::Json(Value::String(s)) => {
            let result = match method {
                "includes" => Value::Bool(s.contains(&arg_text(0))),
                "startsWith" => Value::Bool(s.starts_with(&arg_text(0))),
                "endsWith" => Value::Bool(s.ends_with(&arg_text(0))),
                "toUpperCase" => Value::String(s.to_uppercase()),
                "toLowerCase" => Value::String(s.to_lowercase()),
                "trim" => Value::String(s.trim().to_string()),
                _ => return Err(unsupported("string")),
            };
            Ok(Operand::Json(result))
        }
        Operand::Json(Value::Array(items)) => {
            let result = match method {
                "includes" => {
                    let needle = args.first().cloned().unwrap_or(Operand::Undefined);
                    Value::Bool(items.iter().any(|item| strict_eq(&Operand::Json(item.clone()), &needle)))
                }
                "join" => {
                    let separator = args.first().map_or_else(|| ",".to_string(), Operand::to_text);
                    Value::String(items.iter().map(text).collect::<Vec<_>>().join(&separator))
                }
                _ => return Err(unsupported("array")),
            };
            Ok(Operand::Json(result))
        }
        other => Err(unsupported(other.kind())),
    }
}

fn binary<T: Target>(op: BinaryOp, left: &Operand<T>, right: &Operand<T>) -> Value {
    let arithmetic = |f: fn(f64, f64) -> f64| number(f(left.to_number(), right.to_number()));
    match op {
        BinaryOp::Add if left.concatenates() || right.concatenates() => {
            Value::String(left.to_text() + &right.to_text())
        }
        BinaryOp::Add => arithmetic(|a, b| a + b),
        BinaryOp::Sub => arithmetic(|a, b| a - b),
        BinaryOp::Mul => arithmetic(|a, b| a * b),
        BinaryOp::Div => arithmetic(|a, b| a / b),
        BinaryOp::Rem => arithmetic(|a, b| a % b),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Value::Bool(compare(op, left, right)),
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_eq(left, right)),
    }
}

fn compare<T: Target>(op: BinaryOp, left: &Operand<T>, right: &Operand<T>) -> bool {
    let ordering = match (left, right) {
        (Operand::Json(Value::String(a)), Operand::Json(Value::String(b))) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn loose_eq<T: Target>(left: &Operand<T>, right: &Operand<T>) -> bool {
    use Operand::{Json, Target as Bound};
    match (left, right) {
        (l, r) if l.is_nullish() || r.is_nullish() => l.is_nullish() && r.is_nullish(),
        (Bound(a), Bound(b)) => a.label() == b.label(),
        (Bound(t), Json(Value::String(s))) | (Json(Value::String(s)), Bound(t)) => t.label() == *s,
        (Bound(_), _) | (_, Bound(_)) => false,
        (Json(Value::String(a)), Json(Value::String(b))) => a == b,
        (
            Json(Value::Number(_) | Value::Bool(_) | Value::String(_)),
            Json(Value::Number(_) | Value::Bool(_) | Value::String(_)),
        ) => left.to_number() == right.to_number(),
        (Json(a), Json(b)) => a == b,
        _ => false,
    }
}

fn strict_eq<T: Target>(left: &Operand<T>, right: &Operand<T>) -> bool {
    match (left, right) {
        (Operand::Undefined, Operand::Undefined) => true,
        (Operand::Json(Value::Number(a)), Operand::Json(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (Operand::Json(a), Operand::Json(b)) => a == b,
        (Operand::Target(a), Operand::Target(b)) => a.label() == b.label(),
        _ => false,
    }
}
