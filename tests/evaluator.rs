//! Tests for expression evaluation and trace explanations.
use ahash::AHashMap;
use kansoku::ast::grammar::parse_expression;
use kansoku::evaluator::{Bindings, evaluate, explain};
use kansoku::prelude::*;

/// Variables and arguments held in plain maps; everything else is unsupported.
#[derive(Default)]
struct MapBindings {
    variables: AHashMap<String, Value>,
    arguments: AHashMap<String, Value>,
}

impl MapBindings {
    fn var(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.to_string(), value.into());
        self
    }
}

impl Bindings for MapBindings {
    fn resolve(&self, source: &InputSource) -> std::result::Result<Value, EvaluationError> {
        match source {
            InputSource::Variable { name } => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedVariable(name.clone())),
            InputSource::Argument { name } => self
                .arguments
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedArgument(name.clone())),
            other => Err(EvaluationError::UnsupportedInput(other.to_string())),
        }
    }
}

fn eval(text: &str, bindings: &MapBindings) -> std::result::Result<Value, EvaluationError> {
    let expr = parse_expression(text).expect("Failed to parse expression");
    evaluate(&expr, bindings)
}

#[cfg(test)]
mod arithmetic_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_precedence_and_numeric_strings() {
        let bindings = MapBindings::default().var("exptime", "30");
        assert_eq!(
            eval("exptime * 2 + 1", &bindings).unwrap(),
            Value::Number(61.0)
        );
        assert_eq!(eval("abs(1 - 4)", &bindings).unwrap(), Value::Number(3.0));
        assert_eq!(eval("-exptime", &bindings).unwrap(), Value::Number(-30.0));
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval("1 / 0", &MapBindings::default()).unwrap_err();
        assert!(matches!(err, EvaluationError::DivisionByZero));
    }

    #[test]
    fn test_type_mismatch_names_operation() {
        let bindings = MapBindings::default().var("filter", "K");
        let err = eval("filter + 1", &bindings).unwrap_err();
        match err {
            EvaluationError::TypeMismatch {
                operation, found, ..
            } => {
                assert_eq!(operation, "+");
                assert_eq!(found, Value::Str("K".to_string()));
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod comparison_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_and_string_operators_differ() {
        let bindings = MapBindings::default().var("a", "10").var("b", "9");
        assert_eq!(eval("a > b", &bindings).unwrap(), Value::Bool(true));
        // Textual ordering puts "10" before "9".
        assert_eq!(eval("a gt b", &bindings).unwrap(), Value::Bool(false));
        assert_eq!(eval("a lt b", &bindings).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_string_equality() {
        let bindings = MapBindings::default().var("filter", "K");
        assert_eq!(eval(r#"filter eq "K""#, &bindings).unwrap(), Value::Bool(true));
        assert_eq!(eval(r#"filter ne "K""#, &bindings).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_numeric_operator_rejects_text() {
        let bindings = MapBindings::default().var("filter", "K");
        assert!(matches!(
            eval("filter == 1", &bindings),
            Err(EvaluationError::TypeMismatch { .. })
        ));
    }
}

#[cfg(test)]
mod logic_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_circuit_skips_undefined() {
        let bindings = MapBindings::default().var("ready", false);
        // `missing` is never resolved because the left side decides the outcome.
        assert_eq!(
            eval("ready && missing", &bindings).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(eval("!ready || missing", &bindings).unwrap(), Value::Bool(true));
        assert!(matches!(
            eval("!ready && missing", &bindings),
            Err(EvaluationError::UndefinedVariable(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_defined_and_argument_defaults() {
        let bindings = MapBindings::default().var("nothing", Value::Null).arg("GROUP", 0.0);
        assert_eq!(eval("defined(missing)", &bindings).unwrap(), Value::Bool(false));
        assert_eq!(eval("defined(nothing)", &bindings).unwrap(), Value::Bool(false));
        assert_eq!(eval("defined(arg(GROUP))", &bindings).unwrap(), Value::Bool(true));
        assert_eq!(eval("arg(GROUP, 1)", &bindings).unwrap(), Value::Number(0.0));
        assert_eq!(eval("arg(SKY, 1)", &bindings).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_unsupported_input_is_not_treated_as_undefined() {
        let err = eval("defined(cal.dark)", &MapBindings::default()).unwrap_err();
        assert!(matches!(err, EvaluationError::UnsupportedInput(ref s) if s == "cal.dark"));
    }
}

#[cfg(test)]
mod explain_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reason_shows_input_values() {
        let bindings = MapBindings::default().var("exptime", 30.0);
        let expr = parse_expression("exptime > 25").unwrap();
        let evaluation = explain(&expr, &bindings).unwrap();
        assert_eq!(evaluation.value, Value::Bool(true));
        assert_eq!(evaluation.reason, "exptime (was 30) > 25");
    }

    #[test]
    fn test_reason_quotes_strings_and_omits_short_circuited_side() {
        let bindings = MapBindings::default().var("filter", "H");
        let expr = parse_expression(r#"filter eq "K" && missing"#).unwrap();
        let evaluation = explain(&expr, &bindings).unwrap();
        assert_eq!(evaluation.value, Value::Bool(false));
        assert!(evaluation.reason.contains("filter (was 'H') eq"));
        assert!(!evaluation.reason.contains("missing"));
    }
}
