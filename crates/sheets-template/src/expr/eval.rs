use std::cmp::Ordering;

use sheets_codec::{Record, Value};

use super::parser::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};
use super::ExprError;

/// A runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Table(Record),
}

impl Val {
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Table(_) => true,
        }
    }

    /// Text form used in paths and string concatenation. Containers and
    /// null have none.
    pub fn display(&self) -> Option<String> {
        match self {
            Self::Null | Self::Array(_) | Self::Table(_) => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Num(n) => Some(format_number(*n)),
            Self::Str(s) => Some(s.clone()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Table(_) => "table",
        }
    }
}

impl From<&Value> for Val {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Str(s.clone()),
            Value::Integer(i) => Self::Num(*i as f64),
            Value::Float(f) => Self::Num(*f),
            Value::Boolean(b) => Self::Bool(*b),
            Value::Datetime(d) => Self::Str(d.to_string()),
            Value::Array(items) => Self::Array(items.clone()),
            Value::Table(table) => Self::Table(table.clone()),
        }
    }
}

/// Integral numbers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Result of evaluating an expression that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Value(Val),
    /// A referenced identifier or member does not exist.
    Undefined(String),
}

/// Names visible to an expression.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Val>;
}

impl Scope for Record {
    fn lookup(&self, name: &str) -> Option<Val> {
        self.get(name).map(Val::from)
    }
}

macro_rules! value_or_undefined {
    ($outcome:expr) => {
        match $outcome {
            Outcome::Value(v) => v,
            undefined @ Outcome::Undefined(_) => return Ok(undefined),
        }
    };
}

/// Evaluate `expr` against `scope`.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Outcome, ExprError> {
    let value = match expr {
        Expr::Literal(lit) => match lit {
            Literal::Null => Val::Null,
            Literal::Bool(b) => Val::Bool(*b),
            Literal::Num(n) => Val::Num(*n),
            Literal::Str(s) => Val::Str(s.clone()),
        },
        Expr::Ident(name) => match scope.lookup(name) {
            Some(v) => v,
            None => return Ok(Outcome::Undefined(name.clone())),
        },
        Expr::Member(object, key) => {
            let object = value_or_undefined!(evaluate(object, scope)?);
            let key = value_or_undefined!(evaluate(key, scope)?);
            return member(object, key);
        }
        Expr::Unary(op, operand) => {
            let operand = value_or_undefined!(evaluate(operand, scope)?);
            match op {
                UnaryOp::Not => Val::Bool(!operand.truthy()),
                UnaryOp::Neg => Val::Num(-number(&operand, "-")?),
            }
        }
        Expr::Binary(op, left, right) => {
            let left = value_or_undefined!(evaluate(left, scope)?);
            let right = value_or_undefined!(evaluate(right, scope)?);
            binary(*op, left, right)?
        }
        Expr::Logical(op, left, right) => {
            let left = value_or_undefined!(evaluate(left, scope)?);
            let short_circuit = match op {
                LogicalOp::And => !left.truthy(),
                LogicalOp::Or => left.truthy(),
            };
            if short_circuit {
                left
            } else {
                value_or_undefined!(evaluate(right, scope)?)
            }
        }
        Expr::Conditional(test, then, otherwise) => {
            let test = value_or_undefined!(evaluate(test, scope)?);
            let branch = if test.truthy() { then } else { otherwise };
            return evaluate(branch, scope);
        }
    };
    Ok(Outcome::Value(value))
}

fn member(object: Val, key: Val) -> Result<Outcome, ExprError> {
    let found = match (&object, &key) {
        (Val::Table(table), key) => {
            let name = key
                .display()
                .ok_or_else(|| ExprError::InvalidKey(key.type_name().into()))?;
            match table.get(&name) {
                Some(v) => Val::from(v),
                None => return Ok(Outcome::Undefined(name)),
            }
        }
        (Val::Array(items), Val::Num(n)) => match index(*n).and_then(|i| items.get(i)) {
            Some(v) => Val::from(v),
            None => return Ok(Outcome::Undefined(format_number(*n))),
        },
        (Val::Array(items), Val::Str(s)) if s == "length" => Val::Num(items.len() as f64),
        (Val::Str(text), Val::Str(s)) if s == "length" => Val::Num(text.chars().count() as f64),
        (Val::Str(text), Val::Num(n)) => match index(*n).and_then(|i| text.chars().nth(i)) {
            Some(c) => Val::Str(c.to_string()),
            None => return Ok(Outcome::Undefined(format_number(*n))),
        },
        _ => {
            return Err(ExprError::NotAnObject(format!(
                "{}[{}]",
                object.type_name(),
                key.display().unwrap_or_else(|| key.type_name().into())
            )))
        }
    };
    Ok(Outcome::Value(found))
}

fn index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn number(value: &Val, op: &str) -> Result<f64, ExprError> {
    match value {
        Val::Num(n) => Ok(*n),
        other => Err(ExprError::TypeMismatch(format!(
            "{op} expects a number, got {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Val, right: Val) -> Result<Val, ExprError> {
    Ok(match op {
        BinaryOp::Add => match (&left, &right) {
            (Val::Num(a), Val::Num(b)) => Val::Num(a + b),
            (Val::Str(_), _) | (_, Val::Str(_)) => {
                let text = |v: &Val| {
                    v.display()
                        .ok_or_else(|| ExprError::TypeMismatch(format!("cannot concatenate {}", v.type_name())))
                };
                Val::Str(text(&left)? + &text(&right)?)
            }
            _ => {
                return Err(ExprError::TypeMismatch(format!(
                    "cannot add {} and {}",
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
        BinaryOp::Sub => Val::Num(number(&left, "-")? - number(&right, "-")?),
        BinaryOp::Mul => Val::Num(number(&left, "*")? * number(&right, "*")?),
        BinaryOp::Div | BinaryOp::Rem => {
            let a = number(&left, "/")?;
            let b = number(&right, "/")?;
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Val::Num(if op == BinaryOp::Div { a / b } else { a % b })
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            Val::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        BinaryOp::Eq => Val::Bool(loose_eq(&left, &right)),
        BinaryOp::Ne => Val::Bool(!loose_eq(&left, &right)),
        BinaryOp::StrictEq => Val::Bool(left == right),
        BinaryOp::StrictNe => Val::Bool(left != right),
    })
}

/// Order two numbers or two strings.
pub fn compare(left: &Val, right: &Val) -> Result<Ordering, ExprError> {
    match (left, right) {
        (Val::Num(a), Val::Num(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| ExprError::TypeMismatch("cannot order NaN".into())),
        (Val::Str(a), Val::Str(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::TypeMismatch(format!(
            "cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Equality that treats a number and its textual form as equal.
pub fn loose_eq(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Num(n), Val::Str(s)) | (Val::Str(s), Val::Num(n)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        _ => left == right,
    }
}
