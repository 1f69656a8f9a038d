//! Expression trees and their JSON wire form
//!
//! An expression is either a literal, a variable reference, or an operator
//! application. The wire form is `{"op": "...", "args": [...]}`; bare JSON
//! numbers, strings, booleans, nulls and arrays are literals. Parsing
//! validates structure (known operator, arity, depth ceiling) before any
//! budget is consumed, so a malformed or adversarially deep payload is
//! rejected without evaluation.

use crate::error::EvalError;
use crate::value::Value;

/// Maximum nesting depth accepted by the parser. Trees are acyclic by
/// construction (they come from JSON); the depth ceiling bounds stack use.
const MAX_PARSE_DEPTH: usize = 256;

/// An immutable expression tree node.
#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Apply { op: OpCode, args: Vec<Expr> },
}

/// The closed instruction set.
///
/// Every operator is a variant here and nowhere else; the evaluator
/// dispatches with one exhaustive match. Keeping the set closed is what
/// makes the termination guarantee auditable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Abs,
    Sqrt,
    Log,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Sum,
    // boolean
    And,
    Or,
    Not,
    Xor,
    // comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    // control
    If,
    Cond,
    Do,
    // binding
    Let,
    Set,
    // functions
    Def,
    Lambda,
    Call,
    // bounded iteration
    For,
    While,
    // sequences
    List,
    Map,
    Filter,
    Reduce,
}

impl OpCode {
    /// Parse a wire-form operator name.
    pub fn parse(name: &str) -> Option<OpCode> {
        let op = match name {
            "+" | "add" => OpCode::Add,
            "-" | "sub" => OpCode::Sub,
            "*" | "mul" => OpCode::Mul,
            "/" | "div" => OpCode::Div,
            "%" | "mod" => OpCode::Mod,
            "pow" => OpCode::Pow,
            "neg" => OpCode::Neg,
            "abs" => OpCode::Abs,
            "sqrt" => OpCode::Sqrt,
            "log" => OpCode::Log,
            "sin" => OpCode::Sin,
            "cos" => OpCode::Cos,
            "tan" => OpCode::Tan,
            "floor" => OpCode::Floor,
            "ceil" => OpCode::Ceil,
            "round" => OpCode::Round,
            "min" => OpCode::Min,
            "max" => OpCode::Max,
            "sum" => OpCode::Sum,
            "and" => OpCode::And,
            "or" => OpCode::Or,
            "not" => OpCode::Not,
            "xor" => OpCode::Xor,
            "eq" | "==" => OpCode::Eq,
            "ne" | "!=" => OpCode::Ne,
            "lt" | "<" => OpCode::Lt,
            "gt" | ">" => OpCode::Gt,
            "le" | "<=" => OpCode::Le,
            "ge" | ">=" => OpCode::Ge,
            "if" => OpCode::If,
            "cond" => OpCode::Cond,
            "do" => OpCode::Do,
            "let" => OpCode::Let,
            "set" => OpCode::Set,
            "def" => OpCode::Def,
            "lambda" => OpCode::Lambda,
            "call" => OpCode::Call,
            "for" => OpCode::For,
            "while" => OpCode::While,
            "list" => OpCode::List,
            "map" => OpCode::Map,
            "filter" => OpCode::Filter,
            "reduce" => OpCode::Reduce,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical wire name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Mod => "%",
            OpCode::Pow => "pow",
            OpCode::Neg => "neg",
            OpCode::Abs => "abs",
            OpCode::Sqrt => "sqrt",
            OpCode::Log => "log",
            OpCode::Sin => "sin",
            OpCode::Cos => "cos",
            OpCode::Tan => "tan",
            OpCode::Floor => "floor",
            OpCode::Ceil => "ceil",
            OpCode::Round => "round",
            OpCode::Min => "min",
            OpCode::Max => "max",
            OpCode::Sum => "sum",
            OpCode::And => "and",
            OpCode::Or => "or",
            OpCode::Not => "not",
            OpCode::Xor => "xor",
            OpCode::Eq => "eq",
            OpCode::Ne => "ne",
            OpCode::Lt => "lt",
            OpCode::Gt => "gt",
            OpCode::Le => "le",
            OpCode::Ge => "ge",
            OpCode::If => "if",
            OpCode::Cond => "cond",
            OpCode::Do => "do",
            OpCode::Let => "let",
            OpCode::Set => "set",
            OpCode::Def => "def",
            OpCode::Lambda => "lambda",
            OpCode::Call => "call",
            OpCode::For => "for",
            OpCode::While => "while",
            OpCode::List => "list",
            OpCode::Map => "map",
            OpCode::Filter => "filter",
            OpCode::Reduce => "reduce",
        }
    }

    /// (minimum, optional maximum) argument count.
    pub(crate) fn arity(&self) -> (usize, Option<usize>) {
        match self {
            OpCode::Add | OpCode::Mul | OpCode::And | OpCode::Or => (2, None),
            OpCode::Sub
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Xor
            | OpCode::Eq
            | OpCode::Ne
            | OpCode::Lt
            | OpCode::Gt
            | OpCode::Le
            | OpCode::Ge
            | OpCode::Let
            | OpCode::Set
            | OpCode::Lambda
            | OpCode::While
            | OpCode::Map
            | OpCode::Filter => (2, Some(2)),
            OpCode::Neg
            | OpCode::Abs
            | OpCode::Sqrt
            | OpCode::Log
            | OpCode::Sin
            | OpCode::Cos
            | OpCode::Tan
            | OpCode::Floor
            | OpCode::Ceil
            | OpCode::Round
            | OpCode::Not => (1, Some(1)),
            OpCode::Min | OpCode::Max | OpCode::Sum | OpCode::Do | OpCode::Call => (1, None),
            OpCode::If => (2, Some(3)),
            OpCode::Cond => (2, None),
            OpCode::Def => (3, Some(3)),
            OpCode::For => (4, Some(4)),
            OpCode::Reduce => (2, Some(3)),
            OpCode::List => (0, None),
        }
    }
}

/// Parse the JSON wire form into an expression tree.
pub fn parse_expr(json: &serde_json::Value) -> Result<Expr, EvalError> {
    parse_node(json, 0)
}

fn parse_node(json: &serde_json::Value, depth: usize) -> Result<Expr, EvalError> {
    if depth > MAX_PARSE_DEPTH {
        return Err(EvalError::Malformed(format!(
            "expression nesting exceeds {MAX_PARSE_DEPTH}"
        )));
    }

    let serde_json::Value::Object(map) = json else {
        return Value::from_json(json).map(Expr::Literal);
    };

    let op_name = map
        .get("op")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EvalError::Malformed("node object without string \"op\"".into()))?;

    let args = match map.get("args") {
        Some(serde_json::Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(EvalError::Malformed("\"args\" must be an array".into())),
        None => &[],
    };

    // Variable references travel as {"op":"var","args":["name"]}.
    if op_name == "var" {
        let [serde_json::Value::String(name)] = args else {
            return Err(EvalError::Malformed(
                "var takes exactly one string argument".into(),
            ));
        };
        return Ok(Expr::Var(name.clone()));
    }

    let op = OpCode::parse(op_name)
        .ok_or_else(|| EvalError::Malformed(format!("unknown operator: {op_name}")))?;

    let (min, max) = op.arity();
    if args.len() < min || max.is_some_and(|m| args.len() > m) {
        return Err(EvalError::Malformed(format!(
            "operator {} takes {} argument(s), got {}",
            op.name(),
            match max {
                Some(m) if m == min => format!("{min}"),
                Some(m) => format!("{min}..{m}"),
                None => format!("at least {min}"),
            },
            args.len()
        )));
    }

    let args = args
        .iter()
        .map(|a| parse_node(a, depth + 1))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expr::Apply { op, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_operator_application() {
        let expr = parse_expr(&json!({"op": "+", "args": [2, 3]})).unwrap();
        let Expr::Apply { op, args } = expr else {
            panic!("expected apply node");
        };
        assert_eq!(op, OpCode::Add);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn parses_var_nodes() {
        let expr = parse_expr(&json!({"op": "var", "args": ["i"]})).unwrap();
        assert!(matches!(expr, Expr::Var(name) if name == "i"));
    }

    #[test]
    fn bare_json_is_a_literal() {
        assert!(matches!(
            parse_expr(&json!(42)).unwrap(),
            Expr::Literal(Value::Number(n)) if n == 42.0
        ));
        assert!(matches!(
            parse_expr(&json!([1, 2])).unwrap(),
            Expr::Literal(Value::List(items)) if items.len() == 2
        ));
    }

    #[test]
    fn rejects_unknown_operators() {
        let err = parse_expr(&json!({"op": "launch", "args": []})).unwrap_err();
        assert!(matches!(err, EvalError::Malformed(_)));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(parse_expr(&json!({"op": "not", "args": [true, false]})).is_err());
        assert!(parse_expr(&json!({"op": "if", "args": [true]})).is_err());
        assert!(parse_expr(&json!({"op": "for", "args": ["i", 0, 5]})).is_err());
    }

    #[test]
    fn rejects_object_without_op() {
        assert!(parse_expr(&json!({"args": [1]})).is_err());
    }

    #[test]
    fn rejects_pathological_nesting() {
        let mut node = json!(1);
        for _ in 0..400 {
            node = json!({"op": "neg", "args": [node]});
        }
        assert!(matches!(
            parse_expr(&node),
            Err(EvalError::Malformed(_))
        ));
    }

    #[test]
    fn symbolic_and_named_operators_agree() {
        assert_eq!(OpCode::parse("+"), OpCode::parse("add"));
        assert_eq!(OpCode::parse("<="), OpCode::parse("le"));
        assert_eq!(OpCode::parse("missing"), None);
    }
}
