//! Runtime values
//!
//! Values are immutable once constructed. Composite values own their
//! elements; nothing aliases interpreter call-stack storage. Functions are
//! reference-counted closures over their defining environment.

use std::rc::Rc;

use crate::env::Environment;
use crate::error::EvalError;
use crate::expr::Expr;

/// A tagged runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Function(Rc<Lambda>),
    Null,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

/// A closure: parameter names, a body expression and the environment the
/// lambda was defined in, captured by shared read-only reference.
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
    pub captured: Rc<Environment>,
}

impl Value {
    /// Human-readable type tag for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Null => "null",
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(EvalError::type_mismatch("number", other.type_name())),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::type_mismatch("boolean", other.type_name())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], EvalError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(EvalError::type_mismatch("list", other.type_name())),
        }
    }

    pub fn as_function(&self) -> Result<&Rc<Lambda>, EvalError> {
        match self {
            Value::Function(lambda) => Ok(lambda),
            other => Err(EvalError::type_mismatch("function", other.type_name())),
        }
    }

    /// A whole number in a bound-typed position (loop endpoints, indices).
    pub fn as_whole(&self) -> Result<i64, EvalError> {
        let n = self.as_number()?;
        if n.fract() == 0.0 && n.is_finite() {
            Ok(n as i64)
        } else {
            Err(EvalError::type_mismatch("whole number", "fractional number"))
        }
    }

    /// Structural equality for `eq`/`ne`. Values of different types are
    /// unequal (not an error); functions compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }

    /// Build a value from a JSON literal. Objects are not values; the
    /// expression parser handles `{"op": ...}` nodes before this is called.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, EvalError> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| EvalError::Malformed("non-finite number literal".into())),
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(_) => {
                Err(EvalError::Malformed("object is not a literal value".into()))
            }
        }
    }

    /// Render a value for responses and ledger summaries. Functions have no
    /// JSON form and render as an opaque tag.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Function(lambda) => {
                serde_json::Value::String(format!("<function/{}>", lambda.params.len()))
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}
