use super::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The Abstract Syntax Tree of a recipe or rule expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    // Arithmetic
    Sum(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
    Abs(Box<Expression>),

    // Logical
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),

    // Comparison
    Compare(Comparison, Box<Expression>, Box<Expression>),

    // Undefined-value handling
    Defined(Box<Expression>),
    Coalesce(Box<Expression>, Box<Expression>),

    // Leaf nodes
    Literal(Value),
    Interpolated(Vec<StringPart>),
    Input(InputSource),
}

/// A comparison operator. Numeric operators coerce both sides to numbers,
/// string operators compare the textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    SmallerThan,
    SmallerThanOrEqual,
    StrEqual,
    StrNotEqual,
    StrGreaterThan,
    StrGreaterThanOrEqual,
    StrSmallerThan,
    StrSmallerThanOrEqual,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::GreaterThan => ">",
            Comparison::GreaterThanOrEqual => ">=",
            Comparison::SmallerThan => "<",
            Comparison::SmallerThanOrEqual => "<=",
            Comparison::StrEqual => "eq",
            Comparison::StrNotEqual => "ne",
            Comparison::StrGreaterThan => "gt",
            Comparison::StrGreaterThanOrEqual => "ge",
            Comparison::StrSmallerThan => "lt",
            Comparison::StrSmallerThanOrEqual => "le",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "==" => Comparison::Equal,
            "!=" => Comparison::NotEqual,
            ">" => Comparison::GreaterThan,
            ">=" => Comparison::GreaterThanOrEqual,
            "<" => Comparison::SmallerThan,
            "<=" => Comparison::SmallerThanOrEqual,
            "eq" => Comparison::StrEqual,
            "ne" => Comparison::StrNotEqual,
            "gt" => Comparison::StrGreaterThan,
            "ge" => Comparison::StrGreaterThanOrEqual,
            "lt" => Comparison::StrSmallerThan,
            "le" => Comparison::StrSmallerThanOrEqual,
            _ => return None,
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Comparison::Equal
                | Comparison::NotEqual
                | Comparison::GreaterThan
                | Comparison::GreaterThanOrEqual
                | Comparison::SmallerThan
                | Comparison::SmallerThanOrEqual
        )
    }
}

/// A piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringPart {
    Literal(String),
    Interpolation(InputSource),
}

/// Which data object a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectRef {
    Frame,
    Group,
}

impl ObjectRef {
    pub fn prefix(&self) -> &'static str {
        match self {
            ObjectRef::Frame => "frm",
            ObjectRef::Group => "grp",
        }
    }
}

/// A field of a frame or group object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectField {
    File,
    Header(String),
    UserHeader(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunFlag {
    Debug,
    Batch,
}

/// Defines the source of data for a leaf node in the AST.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSource {
    /// A recipe-local variable.
    Variable { name: String },
    /// A parameter of the innermost primitive (or a recipe parameter at top level).
    Argument { name: String },
    Object { object: ObjectRef, field: ObjectField },
    /// The calibration of the named kind selected for the current frame.
    Calibration { kind: String },
    Flag(RunFlag),
    /// A header entry of the object being calibrated (rule predicates only).
    Header { key: String },
    /// The stored index value a rule is evaluated against (rule predicates only).
    Candidate,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Variable { name } => write!(f, "{}", name),
            InputSource::Argument { name } => write!(f, "arg({})", name),
            InputSource::Object { object, field } => match field {
                ObjectField::File => write!(f, "{}.file", object.prefix()),
                ObjectField::Header(key) => write!(f, "{}.hdr.{}", object.prefix(), key),
                ObjectField::UserHeader(key) => write!(f, "{}.uhdr.{}", object.prefix(), key),
            },
            InputSource::Calibration { kind } => write!(f, "cal.{}", kind),
            InputSource::Flag(RunFlag::Debug) => write!(f, "run.debug"),
            InputSource::Flag(RunFlag::Batch) => write!(f, "run.batch"),
            InputSource::Header { key } => write!(f, "hdr.{}", key),
            InputSource::Candidate => write!(f, "value"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Sum(l, r) => write!(f, "({} + {})", l, r),
            Expression::Subtract(l, r) => write!(f, "({} - {})", l, r),
            Expression::Multiply(l, r) => write!(f, "({} * {})", l, r),
            Expression::Divide(l, r) => write!(f, "({} / {})", l, r),
            Expression::Negate(v) => write!(f, "-{}", v),
            Expression::Abs(v) => write!(f, "abs({})", v),
            Expression::Not(v) => write!(f, "!{}", v),
            Expression::And(l, r) => write!(f, "({} && {})", l, r),
            Expression::Or(l, r) => write!(f, "({} || {})", l, r),
            Expression::Compare(op, l, r) => write!(f, "{} {} {}", l, op.symbol(), r),
            Expression::Defined(v) => write!(f, "defined({})", v),
            Expression::Coalesce(v, fallback) => match v.as_ref() {
                Expression::Input(InputSource::Argument { name }) => {
                    write!(f, "arg({}, {})", name, fallback)
                }
                other => write!(f, "({} // {})", other, fallback),
            },
            Expression::Literal(Value::Str(s)) => write!(f, "\"{}\"", s),
            Expression::Literal(v) => write!(f, "{}", v),
            Expression::Interpolated(parts) => {
                write!(f, "\"")?;
                for part in parts {
                    match part {
                        StringPart::Literal(text) => write!(f, "{}", text)?,
                        StringPart::Interpolation(source) => write!(f, "${{{}}}", source)?,
                    }
                }
                write!(f, "\"")
            }
            Expression::Input(source) => write!(f, "{}", source),
        }
    }
}
