use crate::ast::grammar::{
    GrammarError, parse_expression, parse_expression_prefix, parse_path, parse_template,
};
use crate::ast::{
    Capture, EngineCall, Expression, InputSource, Node, ObjectRef, Origin, Statement, Target,
};
use ahash::AHashMap;
use regex::Regex;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_.\-]*)\s*=(.*)$").expect("assignment pattern is valid")
});

/// Defines the contract for parsing a statement introduced by a leading keyword.
///
/// `rest` is the line with the keyword and surrounding whitespace removed.
pub trait LineParser: Send + Sync {
    fn keyword(&self) -> &str;
    fn parse(&self, rest: &str) -> Result<Statement, GrammarError>;
}

fn syntax(input: &str, message: impl Into<String>) -> GrammarError {
    GrammarError {
        input: input.to_string(),
        message: message.into(),
    }
}

/// Splits off the first whitespace-delimited word.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim_start()),
        None => (text, ""),
    }
}

/// Helper for keywords that take a single bare word.
fn require_word<'a>(rest: &'a str, keyword: &str) -> Result<&'a str, GrammarError> {
    match split_word(rest) {
        (word, "") if !word.is_empty() => Ok(word),
        _ => Err(syntax(rest, format!("{} requires exactly one word", keyword))),
    }
}

fn require_expression(rest: &str, keyword: &str) -> Result<Expression, GrammarError> {
    if rest.trim().is_empty() {
        return Err(syntax(rest, format!("{} requires an expression", keyword)));
    }
    parse_expression(rest)
}

fn parse_index(rest: &str) -> Result<Statement, GrammarError> {
    require_word(rest, "index").map(|kind| Statement::Index {
        kind: kind.to_string(),
    })
}

fn parse_sync(rest: &str) -> Result<Statement, GrammarError> {
    match require_word(rest, "sync")? {
        "frm" => Ok(Statement::Sync(ObjectRef::Frame)),
        "grp" => Ok(Statement::Sync(ObjectRef::Group)),
        other => Err(syntax(other, "sync expects 'frm' or 'grp'")),
    }
}

/// Parses `ENGINE ACTION [ARGS]`. Arguments are an expression, or failing that
/// unquoted text with `${path}` interpolations.
fn parse_obey(rest: &str) -> Result<Statement, GrammarError> {
    let (engine, rest) = split_word(rest);
    let (action, args) = split_word(rest);
    if engine.is_empty() || action.is_empty() {
        return Err(syntax(rest, "obey requires an engine and an action"));
    }
    let args = match args.trim() {
        "" => None,
        text => Some(parse_expression(text).or_else(|_| parse_template(text))?),
    };
    Ok(Statement::EngineCall(EngineCall {
        engine: engine.to_string(),
        action: action.to_string(),
        args,
        capture: Capture::Unguarded,
    }))
}

/// Master macro to define the keyword parsers, their registration, and their creation.
macro_rules! define_line_parsers {
    ( $( ($struct_name:ident, $keyword:literal, Expr, $variant:path) ),* $(,)? ; $( ($fn_struct_name:ident, $fn_keyword:literal, Custom, $parse_fn:path) ),* $(,)? ) => {
        $(
            struct $struct_name;
            impl LineParser for $struct_name {
                fn keyword(&self) -> &str { $keyword }
                fn parse(&self, rest: &str) -> Result<Statement, GrammarError> {
                    require_expression(rest, $keyword).map($variant)
                }
            }
        )*
        $(
            struct $fn_struct_name;
            impl LineParser for $fn_struct_name {
                fn keyword(&self) -> &str { $fn_keyword }
                fn parse(&self, rest: &str) -> Result<Statement, GrammarError> {
                    $parse_fn(rest)
                }
            }
        )*

        pub(super) fn register_default_parsers(registry: &mut AHashMap<String, Box<dyn LineParser>>) {
            $( registry.insert($keyword.to_string(), Box::new($struct_name)); )*
            $( registry.insert($fn_keyword.to_string(), Box::new($fn_struct_name)); )*
        }

        pub(super) fn create_parser_by_name(name: &str) -> Option<Box<dyn LineParser>> {
            match name {
                $( $keyword => Some(Box::new($struct_name)), )*
                $( $fn_keyword => Some(Box::new($fn_struct_name)), )*
                _ => None,
            }
        }
    };
}

define_line_parsers! {
    (PrintParser, "print", Expr, Statement::Print),
    (WarnParser, "warn", Expr, Statement::Warn),
    (ThrowParser, "throw", Expr, Statement::Throw),
    (DisplayParser, "display", Expr, Statement::Display),

    ;

    (ObeyParser, "obey", Custom, parse_obey),
    (IndexParser, "index", Custom, parse_index),
    (SyncParser, "sync", Custom, parse_sync),
}

/// Classifies single source lines into statements.
///
/// Conditionals and assignments are structural; every other statement is
/// looked up by its leading keyword in the registry.
pub(super) struct LineParsers<'a> {
    registry: &'a AHashMap<String, Box<dyn LineParser>>,
}

impl<'a> LineParsers<'a> {
    pub(super) fn new(registry: &'a AHashMap<String, Box<dyn LineParser>>) -> Self {
        Self { registry }
    }

    pub(super) fn parse_line(&self, line: &str) -> Result<Statement, GrammarError> {
        let line = line.trim();
        let (word, rest) = split_word(line);
        if word == "if" {
            return self.parse_conditional(rest);
        }
        if let Some(caps) = ASSIGNMENT.captures(line) {
            let value = caps.get(2).map_or("", |m| m.as_str());
            // `a == b` is a comparison, not an assignment.
            if !value.starts_with('=') {
                let target = caps.get(1).map_or("", |m| m.as_str());
                return self.parse_assignment(target, value);
            }
        }
        match self.registry.get(word) {
            Some(parser) => parser.parse(rest),
            None => Err(syntax(line, format!("unknown statement '{}'", word))),
        }
    }

    fn is_obey(&self, word: &str) -> bool {
        self.registry
            .get(word)
            .is_some_and(|parser| parser.keyword() == "obey")
    }

    fn parse_conditional(&self, rest: &str) -> Result<Statement, GrammarError> {
        let (condition, rest) = parse_expression_prefix(rest)?;
        let (then, inner) = split_word(rest);
        if then != "then" || inner.is_empty() {
            return Err(syntax(rest, "expected 'then' followed by a statement"));
        }
        let statement = match self.parse_line(inner)? {
            Statement::EngineCall(call) if call.capture == Capture::Unguarded => {
                Statement::EngineCall(EngineCall {
                    capture: Capture::Ignore,
                    ..call
                })
            }
            other => other,
        };
        Ok(Statement::Conditional {
            condition,
            then: Box::new(Node::new(Origin::default(), statement)),
        })
    }

    fn parse_target(text: &str) -> Result<Target, GrammarError> {
        if text == "status" {
            return Ok(Target::Status);
        }
        match parse_path(text)? {
            InputSource::Variable { name } => Ok(Target::Variable(name)),
            InputSource::Object { object, field } => Ok(Target::Object { object, field }),
            InputSource::Calibration { kind } => Ok(Target::Calibration { kind }),
            other => Err(syntax(text, format!("cannot assign to '{}'", other))),
        }
    }

    fn parse_assignment(&self, target: &str, value: &str) -> Result<Statement, GrammarError> {
        let target = Self::parse_target(target)?;
        let value = value.trim();
        let (word, rest) = split_word(value);
        if self.is_obey(word) {
            let Statement::EngineCall(call) = parse_obey(rest)? else {
                return Err(syntax(value, "malformed engine call"));
            };
            let capture = match target {
                Target::Status => Capture::Status,
                Target::Variable(name) => Capture::Variable(name),
                other => {
                    return Err(syntax(
                        value,
                        format!("engine status cannot be stored in '{}'", other),
                    ));
                }
            };
            return Ok(Statement::EngineCall(EngineCall { capture, ..call }));
        }
        if value.is_empty() {
            return Err(syntax(&target.to_string(), "assignment requires a value"));
        }
        Ok(Statement::Assign {
            target,
            value: parse_expression(value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ObjectField, Value};

    fn parse(line: &str) -> Result<Statement, GrammarError> {
        let mut registry = AHashMap::new();
        register_default_parsers(&mut registry);
        if let Some(parser) = create_parser_by_name("print") {
            registry.insert("orac_print".to_string(), parser);
        }
        LineParsers::new(&registry).parse_line(line)
    }

    #[test]
    fn bare_obey_is_unguarded() {
        let Ok(Statement::EngineCall(call)) = parse("obey kappa add \"in=a out=b\"") else {
            panic!("expected an engine call");
        };
        assert_eq!(call.engine, "kappa");
        assert_eq!(call.action, "add");
        assert_eq!(call.capture, Capture::Unguarded);
        assert_eq!(
            call.args,
            Some(Expression::Literal(Value::Str("in=a out=b".to_string())))
        );
    }

    #[test]
    fn unquoted_obey_arguments_are_a_template() {
        let Ok(Statement::EngineCall(call)) = parse("obey kappa add in=${frm.file}") else {
            panic!("expected an engine call");
        };
        assert!(matches!(call.args, Some(Expression::Interpolated(_))));
    }

    #[test]
    fn captured_obey_keeps_its_variable() {
        let Ok(Statement::EngineCall(call)) = parse("st = obey kappa stats") else {
            panic!("expected an engine call");
        };
        assert_eq!(call.capture, Capture::Variable("st".to_string()));

        let Ok(Statement::EngineCall(call)) = parse("status = obey kappa stats") else {
            panic!("expected an engine call");
        };
        assert_eq!(call.capture, Capture::Status);
    }

    #[test]
    fn conditional_call_is_ignored_not_wrapped() {
        let Ok(Statement::Conditional { then, .. }) = parse("if run.debug then obey kappa stats")
        else {
            panic!("expected a conditional");
        };
        let Statement::EngineCall(call) = then.statement else {
            panic!("expected an engine call");
        };
        assert_eq!(call.capture, Capture::Ignore);
    }

    #[test]
    fn assignment_targets() {
        assert!(matches!(
            parse("frm.uhdr.QUALITY = 1"),
            Ok(Statement::Assign {
                target: Target::Object {
                    object: ObjectRef::Frame,
                    field: ObjectField::UserHeader(_)
                },
                ..
            })
        ));
        assert!(matches!(
            parse("cal.dark = \"dark_001\""),
            Ok(Statement::Assign {
                target: Target::Calibration { .. },
                ..
            })
        ));
        assert!(parse("run.debug = 1").is_err());
    }

    #[test]
    fn comparison_is_not_an_assignment() {
        assert!(parse("x == 1").is_err());
    }

    #[test]
    fn alias_maps_to_builtin() {
        assert!(matches!(parse("orac_print \"hello\""), Ok(Statement::Print(_))));
    }

    #[test]
    fn sync_and_index() {
        assert_eq!(parse("sync grp"), Ok(Statement::Sync(ObjectRef::Group)));
        assert_eq!(
            parse("index dark"),
            Ok(Statement::Index {
                kind: "dark".to_string()
            })
        );
        assert!(parse("sync cal").is_err());
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        let err = parse("frobnicate now").unwrap_err();
        assert!(err.message.contains("frobnicate"));
    }
}
