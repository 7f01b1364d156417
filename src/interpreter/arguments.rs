//! Primitive argument strings: `key=value` pairs separated by whitespace.

use crate::ast::Value;
use crate::ast::grammar::identifier;
use ahash::AHashMap;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt},
    multi::separated_list0,
    sequence::{delimited, pair, preceded},
};

type Arguments = AHashMap<String, Value>;

fn quoted(input: &str) -> IResult<&str, Value, nom::error::VerboseError<&str>> {
    map(delimited(char('"'), take_while(|c| c != '"'), char('"')), |s: &str| {
        Value::Str(s.to_string())
    })(input)
}

fn bare(input: &str) -> IResult<&str, Value, nom::error::VerboseError<&str>> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != '"'),
        Value::from_field,
    )(input)
}

fn argument(input: &str) -> IResult<&str, (&str, Value), nom::error::VerboseError<&str>> {
    map(
        pair(identifier, opt(preceded(char('='), alt((quoted, bare))))),
        // A bare word is a flag.
        |(key, value)| (key, value.unwrap_or(Value::Bool(true))),
    )(input)
}

/// Parses an argument string. Values may be double quoted to contain spaces;
/// unquoted numeric values become numbers.
pub fn parse_arguments(text: &str) -> Result<Arguments, String> {
    all_consuming(delimited(
        multispace0,
        separated_list0(multispace1, argument),
        multispace0,
    ))(text)
    .map(|(_, pairs)| {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    })
    .map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => match e.errors.first() {
            Some((rest, _)) => format!("unexpected input at '{}'", rest),
            None => "unparseable argument string".to_string(),
        },
        nom::Err::Incomplete(_) => "unexpected end of argument string".to_string(),
    })
}
