//! # Expression grammar
//!
//! `nom` parsers for the expression language shared by recipe statements,
//! primitive argument strings and calibration rule predicates.
//!
//! Precedence, lowest first: `||`, `&&`, comparisons (non-associative), `+ -`,
//! `* /`, unary `! -`, primaries.

use super::{
    Comparison, Expression, InputSource, ObjectField, ObjectRef, RunFlag, StringPart, Value,
};
use nom::{
    Err, IResult,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, cut, map, map_opt, map_res, not, opt, peek, recognize, value},
    error::{VerboseError, context, convert_error},
    multi::{fold_many0, many0, many0_count, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use thiserror::Error;

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot parse '{input}': {message}")]
pub struct GrammarError {
    pub input: String,
    pub message: String,
}

fn grammar_error(input: &str, err: Err<VerboseError<&str>>) -> GrammarError {
    let message = match err {
        Err::Error(e) | Err::Failure(e) => convert_error(input, e).trim().to_string(),
        Err::Incomplete(_) => "unexpected end of input".to_string(),
    };
    GrammarError {
        input: input.to_string(),
        message,
    }
}

/// Parses a complete expression. Surrounding whitespace is ignored.
pub fn parse_expression(input: &str) -> Result<Expression, GrammarError> {
    all_consuming(terminated(expression, multispace0))(input)
        .map(|(_, expr)| expr)
        .map_err(|e| grammar_error(input, e))
}

/// Parses an expression at the start of `input` and returns it with the unparsed rest.
pub fn parse_expression_prefix(input: &str) -> Result<(Expression, &str), GrammarError> {
    expression(input)
        .map(|(rest, expr)| (expr, rest))
        .map_err(|e| grammar_error(input, e))
}

/// Parses a calibration rule predicate.
///
/// A predicate starting with a comparison operator uses the stored index value as its
/// left operand (`>= hdr.EXPTIME`); anything else is a full expression that refers to the
/// stored value explicitly as `value`. An empty predicate yields `None`.
pub fn parse_rule_predicate(input: &str) -> Result<Option<Expression>, GrammarError> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    let implicit = all_consuming(terminated(
        pair(ws(comparison_operator), additive),
        multispace0,
    ))(input);
    if let Ok((_, (op, rhs))) = implicit {
        return Ok(Some(Expression::Compare(
            op,
            Box::new(Expression::Input(InputSource::Candidate)),
            Box::new(rhs),
        )));
    }
    parse_expression(input).map(Some)
}

/// Parses unquoted text with `${path}` interpolations, as used by primitive argument strings.
pub fn parse_template(input: &str) -> Result<Expression, GrammarError> {
    all_consuming(many0(alt((
        interpolation,
        map(take_while1(|c| c != '$'), |s: &str| {
            StringPart::Literal(s.to_string())
        }),
        map(char('$'), |_| StringPart::Literal("$".to_string())),
    ))))(input)
    .map(|(_, parts)| build_string(parts))
    .map_err(|e| grammar_error(input, e))
}

/// Parses a dotted path such as `frm.hdr.FILTER` into an input source.
pub fn parse_path(input: &str) -> Result<InputSource, GrammarError> {
    all_consuming(path)(input.trim())
        .map(|(_, source)| source)
        .map_err(|e| grammar_error(input, e))
}

/// Maps path segments onto an input source. Returns `None` for unknown shapes.
pub fn classify_path(segments: &[&str]) -> Option<InputSource> {
    let object = |prefix: &str| match prefix {
        "frm" => Some(ObjectRef::Frame),
        "grp" => Some(ObjectRef::Group),
        _ => None,
    };
    match segments {
        ["value"] => Some(InputSource::Candidate),
        [name] => Some(InputSource::Variable {
            name: name.to_string(),
        }),
        [prefix, "file"] => object(prefix).map(|object| InputSource::Object {
            object,
            field: ObjectField::File,
        }),
        [prefix, "hdr", key] => object(prefix).map(|object| InputSource::Object {
            object,
            field: ObjectField::Header(key.to_string()),
        }),
        [prefix, "uhdr", key] => object(prefix).map(|object| InputSource::Object {
            object,
            field: ObjectField::UserHeader(key.to_string()),
        }),
        ["cal", kind] => Some(InputSource::Calibration {
            kind: kind.to_string(),
        }),
        ["run", "debug"] => Some(InputSource::Flag(RunFlag::Debug)),
        ["run", "batch"] => Some(InputSource::Flag(RunFlag::Batch)),
        ["hdr", key] => Some(InputSource::Header {
            key: key.to_string(),
        }),
        _ => None,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> ParseResult<'a, O>
where
    F: FnMut(&'a str) -> ParseResult<'a, O>,
{
    preceded(multispace0, inner)
}

/// Matches a keyword only when it is not the prefix of a longer identifier.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    terminated(tag(word), not(peek(satisfy(is_ident_char))))
}

pub(crate) fn identifier(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        many0_count(satisfy(is_ident_char)),
    ))(input)
}

/// A path segment after a dot. Header keys may contain dashes between alphanumeric runs.
fn segment(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        take_while1(is_ident_char),
        many0_count(pair(char('-'), take_while1(is_ident_char))),
    ))(input)
}

fn path(input: &str) -> ParseResult<'_, InputSource> {
    context(
        "path",
        map_opt(
            pair(identifier, many0(preceded(char('.'), segment))),
            |(head, rest): (&str, Vec<&str>)| {
                let mut segments = vec![head];
                segments.extend(rest);
                classify_path(&segments)
            },
        ),
    )(input)
}

fn number(input: &str) -> ParseResult<'_, Expression> {
    context(
        "number",
        map_res(
            recognize(tuple((
                digit1,
                opt(pair(char('.'), digit0)),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            ))),
            |s: &str| s.parse::<f64>().map(|n| Expression::Literal(Value::Number(n))),
        ),
    )(input)
}

fn interpolation(input: &str) -> ParseResult<'_, StringPart> {
    context(
        "interpolation",
        map(
            delimited(tag("${"), cut(ws(path)), cut(ws(char('}')))),
            StringPart::Interpolation,
        ),
    )(input)
}

fn escaped(input: &str) -> ParseResult<'_, StringPart> {
    map(
        preceded(char('\\'), satisfy(|_| true)),
        |c| match c {
            'n' => StringPart::Literal("\n".to_string()),
            't' => StringPart::Literal("\t".to_string()),
            other => StringPart::Literal(other.to_string()),
        },
    )(input)
}

fn build_string(parts: Vec<StringPart>) -> Expression {
    let mut merged: Vec<StringPart> = Vec::new();
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(StringPart::Literal(acc)), StringPart::Literal(text)) => acc.push_str(&text),
            (_, part) => merged.push(part),
        }
    }
    match merged.as_slice() {
        [] => Expression::Literal(Value::Str(String::new())),
        [StringPart::Literal(text)] => Expression::Literal(Value::Str(text.clone())),
        _ => Expression::Interpolated(merged),
    }
}

fn string_literal(input: &str) -> ParseResult<'_, Expression> {
    context(
        "string",
        map(
            delimited(
                char('"'),
                many0(alt((
                    interpolation,
                    escaped,
                    map(take_while1(|c| c != '"' && c != '\\' && c != '$'), |s: &str| {
                        StringPart::Literal(s.to_string())
                    }),
                    map(char('$'), |_| StringPart::Literal("$".to_string())),
                ))),
                cut(char('"')),
            ),
            build_string,
        ),
    )(input)
}

fn constant(input: &str) -> ParseResult<'_, Expression> {
    alt((
        value(Expression::Literal(Value::Bool(true)), keyword("true")),
        value(Expression::Literal(Value::Bool(false)), keyword("false")),
        value(Expression::Literal(Value::Null), keyword("undef")),
    ))(input)
}

fn argument_name(input: &str) -> ParseResult<'_, String> {
    alt((
        map(identifier, str::to_string),
        map(
            delimited(char('"'), take_while1(|c| c != '"'), char('"')),
            str::to_string,
        ),
    ))(input)
}

fn call(input: &str) -> ParseResult<'_, Expression> {
    let open = |name: &'static str| pair(keyword(name), ws(char('(')));
    let close = || ws(char(')'));
    alt((
        map(
            delimited(open("abs"), cut(expression), cut(close())),
            |e| Expression::Abs(Box::new(e)),
        ),
        map(
            delimited(open("defined"), cut(expression), cut(close())),
            |e| Expression::Defined(Box::new(e)),
        ),
        map(
            delimited(
                open("arg"),
                cut(pair(ws(argument_name), opt(preceded(ws(char(',')), expression)))),
                cut(close()),
            ),
            |(name, fallback)| {
                let input = Expression::Input(InputSource::Argument { name });
                match fallback {
                    Some(fallback) => Expression::Coalesce(Box::new(input), Box::new(fallback)),
                    None => input,
                }
            },
        ),
    ))(input)
}

fn primary(input: &str) -> ParseResult<'_, Expression> {
    ws(alt((
        number,
        string_literal,
        constant,
        call,
        delimited(char('('), cut(expression), cut(ws(char(')')))),
        map(path, Expression::Input),
    )))(input)
}

fn unary(input: &str) -> ParseResult<'_, Expression> {
    alt((
        map(preceded(ws(terminated(char('!'), not(char('=')))), unary), |e| {
            Expression::Not(Box::new(e))
        }),
        map(preceded(ws(char('-')), unary), |e| {
            Expression::Negate(Box::new(e))
        }),
        primary,
    ))(input)
}

fn multiplicative(input: &str) -> ParseResult<'_, Expression> {
    let (input, first) = unary(input)?;
    fold_many0(
        pair(ws(one_of("*/")), unary),
        move || first.clone(),
        |acc, (op, rhs)| match op {
            '*' => Expression::Multiply(Box::new(acc), Box::new(rhs)),
            _ => Expression::Divide(Box::new(acc), Box::new(rhs)),
        },
    )(input)
}

fn additive(input: &str) -> ParseResult<'_, Expression> {
    let (input, first) = multiplicative(input)?;
    fold_many0(
        pair(ws(one_of("+-")), multiplicative),
        move || first.clone(),
        |acc, (op, rhs)| match op {
            '+' => Expression::Sum(Box::new(acc), Box::new(rhs)),
            _ => Expression::Subtract(Box::new(acc), Box::new(rhs)),
        },
    )(input)
}

fn comparison_operator(input: &str) -> ParseResult<'_, Comparison> {
    map_opt(
        alt((
            tag("=="),
            tag("!="),
            tag("<="),
            tag(">="),
            tag("<"),
            tag(">"),
            keyword("eq"),
            keyword("ne"),
            keyword("le"),
            keyword("ge"),
            keyword("lt"),
            keyword("gt"),
        )),
        Comparison::from_symbol,
    )(input)
}

fn comparison(input: &str) -> ParseResult<'_, Expression> {
    let (input, left) = additive(input)?;
    let (input, right) = opt(pair(ws(comparison_operator), cut(additive)))(input)?;
    Ok((
        input,
        match right {
            Some((op, right)) => Expression::Compare(op, Box::new(left), Box::new(right)),
            None => left,
        },
    ))
}

fn conjunction(input: &str) -> ParseResult<'_, Expression> {
    map(separated_list1(ws(tag("&&")), comparison), |terms| {
        fold_terms(terms, |l, r| Expression::And(Box::new(l), Box::new(r)))
    })(input)
}

fn expression(input: &str) -> ParseResult<'_, Expression> {
    map(separated_list1(ws(tag("||")), conjunction), |terms| {
        fold_terms(terms, |l, r| Expression::Or(Box::new(l), Box::new(r)))
    })(input)
}

fn fold_terms(
    terms: Vec<Expression>,
    combine: impl Fn(Expression, Expression) -> Expression,
) -> Expression {
    let mut iter = terms.into_iter();
    let first = iter.next().unwrap_or(Expression::Literal(Value::Null));
    iter.fold(first, combine)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(source: InputSource) -> Box<Expression> {
        Box::new(Expression::Input(source))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 > 6 && !run.batch").unwrap();
        let expected = Expression::And(
            Box::new(Expression::Compare(
                Comparison::GreaterThan,
                Box::new(Expression::Sum(
                    Box::new(Expression::Literal(Value::Number(1.0))),
                    Box::new(Expression::Multiply(
                        Box::new(Expression::Literal(Value::Number(2.0))),
                        Box::new(Expression::Literal(Value::Number(3.0))),
                    )),
                )),
                Box::new(Expression::Literal(Value::Number(6.0))),
            )),
            Box::new(Expression::Not(input(InputSource::Flag(RunFlag::Batch)))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_header_keys_with_dashes() {
        let expr = parse_expression("frm.hdr.MJD-OBS - 1").unwrap();
        assert_eq!(
            expr,
            Expression::Subtract(
                input(InputSource::Object {
                    object: ObjectRef::Frame,
                    field: ObjectField::Header("MJD-OBS".to_string()),
                }),
                Box::new(Expression::Literal(Value::Number(1.0))),
            )
        );
    }

    #[test]
    fn test_interpolated_string() {
        let expr = parse_expression(r#""${frm.file}_dk $5""#).unwrap();
        assert_eq!(
            expr,
            Expression::Interpolated(vec![
                StringPart::Interpolation(InputSource::Object {
                    object: ObjectRef::Frame,
                    field: ObjectField::File,
                }),
                StringPart::Literal("_dk $5".to_string()),
            ])
        );
    }

    #[test]
    fn test_identifier_starting_with_keyword() {
        let expr = parse_expression("information").unwrap();
        assert_eq!(
            expr,
            Expression::Input(InputSource::Variable {
                name: "information".to_string()
            })
        );
    }

    #[test]
    fn test_rule_predicate_implicit_operand() {
        let expr = parse_rule_predicate("eq hdr.FILTER").unwrap().unwrap();
        assert_eq!(
            expr,
            Expression::Compare(
                Comparison::StrEqual,
                input(InputSource::Candidate),
                input(InputSource::Header {
                    key: "FILTER".to_string()
                }),
            )
        );
        assert_eq!(parse_rule_predicate("   ").unwrap(), None);
        assert!(parse_rule_predicate("abs(value - hdr.ORACTIME) < 1").is_ok());
    }

    #[test]
    fn test_arg_with_default() {
        let expr = parse_expression("arg(GROUP, 1)").unwrap();
        assert_eq!(
            expr,
            Expression::Coalesce(
                input(InputSource::Argument {
                    name: "GROUP".to_string()
                }),
                Box::new(Expression::Literal(Value::Number(1.0))),
            )
        );
    }

    #[test]
    fn test_rejects_unknown_path_and_trailing_garbage() {
        assert!(parse_expression("frm.colour").is_err());
        assert!(parse_expression("1 + ").is_err());
        assert!(parse_expression("a b").is_err());
    }

    #[test]
    fn test_prefix_leaves_rest() {
        let (expr, rest) = parse_expression_prefix("x > 2 then print x").unwrap();
        assert!(matches!(expr, Expression::Compare(Comparison::GreaterThan, _, _)));
        assert_eq!(rest.trim_start(), "then print x");
    }

    #[test]
    fn test_template() {
        let expr = parse_template("IN=${frm.file} OUT=x").unwrap();
        assert!(matches!(expr, Expression::Interpolated(ref parts) if parts.len() == 3));
        assert_eq!(
            parse_template("A=1").unwrap(),
            Expression::Literal(Value::Str("A=1".to_string()))
        );
    }
}
