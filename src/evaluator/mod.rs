use crate::ast::{EvaluationTrace, Expression, InputSource, Value};
use crate::error::EvaluationError;
use crate::trace::TraceFormatter;

mod engine;

use engine::AstEngine;

/// Resolves the leaf inputs of an expression.
///
/// The interpreter resolves variables, arguments, frame/group fields and calibrations
/// from the run context; rule predicates resolve the stored index value and the header
/// of the object being calibrated. Inputs a context does not provide should yield
/// `EvaluationError::UnsupportedInput`.
pub trait Bindings {
    fn resolve(&self, source: &InputSource) -> Result<Value, EvaluationError>;
}

/// The value of an evaluated expression together with a readable explanation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub value: Value,
    pub reason: String,
}

/// Evaluates an expression and returns its value.
pub fn evaluate<B: Bindings + ?Sized>(
    expression: &Expression,
    bindings: &B,
) -> Result<Value, EvaluationError> {
    evaluate_traced(expression, bindings).map(|trace| trace.get_outcome())
}

/// Evaluates an expression and keeps the full evaluation trace.
pub fn evaluate_traced<B: Bindings + ?Sized>(
    expression: &Expression,
    bindings: &B,
) -> Result<EvaluationTrace, EvaluationError> {
    AstEngine::new(expression, bindings).evaluate()
}

/// Evaluates an expression and formats the trace into a human readable reason.
pub fn explain<B: Bindings + ?Sized>(
    expression: &Expression,
    bindings: &B,
) -> Result<Evaluation, EvaluationError> {
    let trace = evaluate_traced(expression, bindings)?;
    Ok(Evaluation {
        value: trace.get_outcome(),
        reason: TraceFormatter::format_trace(&trace),
    })
}
