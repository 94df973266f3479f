//! Arbitrary-precision evaluation of parsed conditions.

use num_bigint::BigInt;
use num_traits::{Pow, ToPrimitive, Zero};

use super::parser::{BinaryOp, Expr};

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    /// Unbounded integer; registers, flags and literals resolve to this.
    Int(BigInt),
    /// Result of a comparison or logical operator.
    Bool(bool),
}

/// Evaluation failure; reported to the host log, never panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum EvalError {
    #[error("\"{0}\" cannot be resolved to a value")]
    UnknownOperand(String),
    #[error("operator {0} expects numeric operands")]
    ExpectedNumbers(BinaryOp),
    #[error("operator {0} expects boolean operands")]
    ExpectedBooleans(BinaryOp),
    #[error("division by zero")]
    DivisionByZero,
    #[error("exponent too large")]
    ExponentTooLarge,
}

/// Resolves leaf terms to values; the caller decides what a register, flag
/// or literal means.
pub(crate) trait TermResolver {
    fn resolve(&self, term: &str) -> Result<Value, EvalError>;
}

impl<F> TermResolver for F
where
    F: Fn(&str) -> Result<Value, EvalError>,
{
    fn resolve(&self, term: &str) -> Result<Value, EvalError> {
        self(term)
    }
}

/// Evaluates `expr` bottom-up with `resolver` supplying leaf values.
pub(crate) fn evaluate(expr: &Expr, resolver: &dyn TermResolver) -> Result<Value, EvalError> {
    match expr {
        Expr::Term(term) => resolver.resolve(term),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, resolver)?;
            let rhs = evaluate(rhs, resolver)?;
            apply(*op, lhs, rhs)
        }
    }
}

fn apply(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let (Value::Bool(lhs), Value::Bool(rhs)) = (lhs, rhs) else {
                return Err(EvalError::ExpectedBooleans(op));
            };
            Ok(Value::Bool(if op == BinaryOp::And {
                lhs && rhs
            } else {
                lhs || rhs
            }))
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (lhs, rhs) {
                (Value::Int(lhs), Value::Int(rhs)) => lhs == rhs,
                (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
                _ => return Err(EvalError::ExpectedNumbers(op)),
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let (Value::Int(lhs), Value::Int(rhs)) = (lhs, rhs) else {
                return Err(EvalError::ExpectedNumbers(op));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => lhs < rhs,
                BinaryOp::Gt => lhs > rhs,
                BinaryOp::Le => lhs <= rhs,
                _ => lhs >= rhs,
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            let (Value::Int(lhs), Value::Int(rhs)) = (lhs, rhs) else {
                return Err(EvalError::ExpectedNumbers(op));
            };
            match op {
                BinaryOp::Add => Ok(Value::Int(lhs + rhs)),
                BinaryOp::Sub => Ok(Value::Int(lhs - rhs)),
                BinaryOp::Mul => Ok(Value::Int(lhs * rhs)),
                BinaryOp::Div => {
                    if rhs.is_zero() {
                        return Err(EvalError::DivisionByZero);
                    }
                    Ok(Value::Int(lhs / rhs))
                }
                _ => {
                    let exponent = rhs.to_u32().ok_or(EvalError::ExponentTooLarge)?;
                    Ok(Value::Int(lhs.pow(exponent)))
                }
            }
        }
    }
}
