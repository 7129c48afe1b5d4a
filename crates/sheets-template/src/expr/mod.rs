//! A small, sandboxed expression language for path templates and sort
//! comparators.
//!
//! Expressions can read names from a [`Scope`], index into tables and
//! arrays, and combine values with the usual arithmetic, comparison and
//! logical operators. Nothing else is reachable: there are no calls, no
//! assignment and no globals.
//!
//! Evaluation distinguishes two kinds of "no value": an identifier or member
//! that does not exist yields [`Outcome::Undefined`], while type errors and
//! division by zero are [`ExprError`]s.

mod eval;
mod lexer;
mod parser;

pub use eval::{compare, evaluate, format_number, loose_eq, Outcome, Scope, Val};
pub use parser::{parse, Expr};

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("cannot index {0}")]
    NotAnObject(String),

    #[error("invalid key of type {0}")]
    InvalidKey(String),

    #[error("division by zero")]
    DivisionByZero,
}
