use super::Bindings;
use crate::ast::{Comparison, EvaluationTrace, Expression, StringPart, Value};
use crate::error::EvaluationError;

// This macro generates a match arm for a binary operation.
macro_rules! eval_op {
    ($self:ident, $l:ident, $r:ident, $op_str:expr, $op_fn:expr, number) => {
        $self.eval_binary($l, $r, $op_str, $op_fn)
    };
    ($self:ident, $l:ident, $r:ident, $op:expr, compare) => {
        $self.eval_comparison($l, $r, $op)
    };
}

/// The core recursive engine for evaluating a single expression against a set of bindings.
pub(super) struct AstEngine<'a, B: Bindings + ?Sized> {
    expression: &'a Expression,
    bindings: &'a B,
}

impl<'a, B: Bindings + ?Sized> AstEngine<'a, B> {
    pub(super) fn new(expression: &'a Expression, bindings: &'a B) -> Self {
        Self {
            expression,
            bindings,
        }
    }

    /// Evaluates the AST and returns a trace of the execution.
    pub(super) fn evaluate(&self) -> Result<EvaluationTrace, EvaluationError> {
        self.evaluate_recursive(self.expression)
    }

    fn evaluate_recursive(&self, expr: &Expression) -> Result<EvaluationTrace, EvaluationError> {
        match expr {
            // --- Arithmetic Operations ---
            Expression::Sum(l, r) => eval_op!(self, l, r, "+", |a, b| Ok(a + b), number),
            Expression::Subtract(l, r) => eval_op!(self, l, r, "-", |a, b| Ok(a - b), number),
            Expression::Multiply(l, r) => eval_op!(self, l, r, "*", |a, b| Ok(a * b), number),
            Expression::Divide(l, r) => eval_op!(
                self,
                l,
                r,
                "/",
                |a, b| {
                    if b == 0.0 {
                        Err(EvaluationError::DivisionByZero)
                    } else {
                        Ok(a / b)
                    }
                },
                number
            ),
            Expression::Negate(v) => self.eval_unary_number(v, "-", |n| -n),
            Expression::Abs(v) => self.eval_unary_number(v, "abs", f64::abs),

            // --- Comparison Operations ---
            Expression::Compare(op, l, r) => eval_op!(self, l, r, *op, compare),

            // --- Logical Operations ---
            Expression::Not(v) => {
                let child_trace = self.evaluate_recursive(v)?;
                let outcome = Value::Bool(!child_trace.get_outcome().is_truthy());
                Ok(EvaluationTrace::UnaryOp {
                    op_symbol: "!",
                    child: Box::new(child_trace),
                    outcome,
                })
            }
            Expression::And(l, r) => {
                let left_trace = self.evaluate_recursive(l)?;
                if !left_trace.get_outcome().is_truthy() {
                    return Ok(EvaluationTrace::BinaryOp {
                        op_symbol: "&&",
                        left: Box::new(left_trace),
                        right: Box::new(EvaluationTrace::NotEvaluated),
                        outcome: Value::Bool(false),
                    });
                }
                let right_trace = self.evaluate_recursive(r)?;
                let outcome = Value::Bool(right_trace.get_outcome().is_truthy());
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "&&",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome,
                })
            }
            Expression::Or(l, r) => {
                let left_trace = self.evaluate_recursive(l)?;
                if left_trace.get_outcome().is_truthy() {
                    return Ok(EvaluationTrace::BinaryOp {
                        op_symbol: "||",
                        left: Box::new(left_trace),
                        right: Box::new(EvaluationTrace::NotEvaluated),
                        outcome: Value::Bool(true),
                    });
                }
                let right_trace = self.evaluate_recursive(r)?;
                let outcome = Value::Bool(right_trace.get_outcome().is_truthy());
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "||",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome,
                })
            }

            // --- Undefined-value handling ---
            Expression::Defined(v) => {
                let defined = match self.evaluate_recursive(v) {
                    Ok(trace) => !trace.get_outcome().is_null(),
                    Err(e) if Self::is_undefined(&e) => false,
                    Err(e) => return Err(e),
                };
                Ok(EvaluationTrace::Leaf {
                    source: expr.to_string(),
                    value: Value::Bool(defined),
                    input: true,
                })
            }
            Expression::Coalesce(v, fallback) => match self.evaluate_recursive(v) {
                Ok(trace) if !trace.get_outcome().is_null() => Ok(trace),
                Ok(_) => self.evaluate_recursive(fallback),
                Err(e) if Self::is_undefined(&e) => self.evaluate_recursive(fallback),
                Err(e) => Err(e),
            },

            // --- Leaves ---
            Expression::Literal(value) => Ok(EvaluationTrace::Leaf {
                source: expr.to_string(),
                value: value.clone(),
                input: false,
            }),
            Expression::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        StringPart::Literal(literal) => text.push_str(literal),
                        StringPart::Interpolation(source) => {
                            text.push_str(&self.bindings.resolve(source)?.to_string())
                        }
                    }
                }
                Ok(EvaluationTrace::Leaf {
                    source: expr.to_string(),
                    value: Value::Str(text),
                    input: true,
                })
            }
            Expression::Input(source) => Ok(EvaluationTrace::Leaf {
                source: source.to_string(),
                value: self.bindings.resolve(source)?,
                input: true,
            }),
        }
    }

    fn is_undefined(error: &EvaluationError) -> bool {
        matches!(
            error,
            EvaluationError::UndefinedVariable(_)
                | EvaluationError::UndefinedArgument(_)
                | EvaluationError::MissingHeader { .. }
        )
    }

    fn eval_unary_number(
        &self,
        v: &Expression,
        op_symbol: &'static str,
        op_fn: fn(f64) -> f64,
    ) -> Result<EvaluationTrace, EvaluationError> {
        let child_trace = self.evaluate_recursive(v)?;
        let outcome = match child_trace.get_outcome().as_number() {
            Some(n) => Value::Number(op_fn(n)),
            None => return Err(self.type_mismatch(op_symbol, "Number", child_trace.get_outcome())),
        };
        Ok(EvaluationTrace::UnaryOp {
            op_symbol,
            child: Box::new(child_trace),
            outcome,
        })
    }

    fn eval_binary<F>(
        &self,
        l: &Expression,
        r: &Expression,
        op_symbol: &'static str,
        op_fn: F,
    ) -> Result<EvaluationTrace, EvaluationError>
    where
        F: Fn(f64, f64) -> Result<f64, EvaluationError>,
    {
        let left_trace = self.evaluate_recursive(l)?;
        let right_trace = self.evaluate_recursive(r)?;
        let outcome = match (
            left_trace.get_outcome().as_number(),
            right_trace.get_outcome().as_number(),
        ) {
            (Some(a), Some(b)) => Value::Number(op_fn(a, b)?),
            (None, _) => return Err(self.type_mismatch(op_symbol, "Number", left_trace.get_outcome())),
            (_, None) => {
                return Err(self.type_mismatch(op_symbol, "Number", right_trace.get_outcome()));
            }
        };
        Ok(EvaluationTrace::BinaryOp {
            op_symbol,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome,
        })
    }

    fn eval_comparison(
        &self,
        l: &Expression,
        r: &Expression,
        op: Comparison,
    ) -> Result<EvaluationTrace, EvaluationError> {
        let left_trace = self.evaluate_recursive(l)?;
        let right_trace = self.evaluate_recursive(r)?;
        let (lv, rv) = (left_trace.get_outcome(), right_trace.get_outcome());

        let ordering = if op.is_numeric() {
            let a = lv
                .as_number()
                .ok_or_else(|| self.type_mismatch(op.symbol(), "Number", lv.clone()))?;
            let b = rv
                .as_number()
                .ok_or_else(|| self.type_mismatch(op.symbol(), "Number", rv.clone()))?;
            a.partial_cmp(&b)
                .ok_or_else(|| self.type_mismatch(op.symbol(), "Number", lv.clone()))?
        } else {
            lv.to_string().cmp(&rv.to_string())
        };

        use std::cmp::Ordering::*;
        let result = match op {
            Comparison::Equal | Comparison::StrEqual => ordering == Equal,
            Comparison::NotEqual | Comparison::StrNotEqual => ordering != Equal,
            Comparison::GreaterThan | Comparison::StrGreaterThan => ordering == Greater,
            Comparison::GreaterThanOrEqual | Comparison::StrGreaterThanOrEqual => {
                ordering != Less
            }
            Comparison::SmallerThan | Comparison::StrSmallerThan => ordering == Less,
            Comparison::SmallerThanOrEqual | Comparison::StrSmallerThanOrEqual => {
                ordering != Greater
            }
        };

        Ok(EvaluationTrace::BinaryOp {
            op_symbol: op.symbol(),
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome: Value::Bool(result),
        })
    }

    fn type_mismatch(&self, operation: &str, expected: &str, found: Value) -> EvaluationError {
        EvaluationError::TypeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            found,
        }
    }
}
