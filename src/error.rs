use crate::ast::Value;
use crate::ast::grammar::GrammarError;
use crate::source::SourceKind;
use thiserror::Error;

/// Errors that can occur while compiling a recipe into a unit.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("{kind} '{name}' not found for instrument '{instrument}'")]
    NotFound {
        kind: SourceKind,
        name: String,
        instrument: String,
    },

    #[error(
        "Primitive '{primitive}' exceeds the inclusion depth limit of {limit} (depth {depth}): {}",
        .chain.join(" -> ")
    )]
    RecursionLimitExceeded {
        primitive: String,
        depth: usize,
        limit: usize,
        chain: Vec<String>,
    },

    #[error("Syntax error in '{source_name}' at line {line}: {message}")]
    Syntax {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("Source resolution failed: {0}")]
    Resolver(String),
}

/// Errors reported by a source resolver.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("not found")]
    NotFound,

    #[error("could not read '{path}': {message}")]
    Io { path: String, message: String },
}

/// Raised when an engine call, or an assignment to the pipeline status, yields a non-OK status.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Engine '{engine}' returned status {status} for action '{action}' (args: '{args}')")]
pub struct PipelineError {
    pub engine: String,
    pub action: String,
    pub args: String,
    pub status: i32,
}

/// Errors that can occur while evaluating an expression.
#[derive(Error, Debug, Clone)]
pub enum EvaluationError {
    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: Value,
    },

    #[error("Variable '{0}' is not defined in any enclosing scope")]
    UndefinedVariable(String),

    #[error("Argument '{0}' was not supplied")]
    UndefinedArgument(String),

    #[error("Header '{key}' not found on {object}")]
    MissingHeader { object: String, key: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Input '{0}' is not available in this context")]
    UnsupportedInput(String),

    #[error("Calibration '{kind}' could not be selected: {source}")]
    Calibration {
        kind: String,
        source: Box<IndexError>,
    },
}

/// Errors that can occur while running a compiled unit.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Recipe has not been compiled for this run")]
    NotCompiled,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Recipe failure: {0}")]
    Thrown(String),

    #[error("Run terminated by user request")]
    Terminated,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Malformed argument string for primitive '{primitive}': {message}")]
    MalformedArguments { primitive: String, message: String },

    #[error("Display request failed: {0}")]
    Display(String),

    #[error(transparent)]
    Calibration(#[from] IndexError),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// Errors from the engine dispatcher.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("No engine named '{0}' is registered")]
    UnknownEngine(String),

    #[error("Engine '{engine}' could not be contacted: {message}")]
    Unavailable { engine: String, message: String },

    #[error("Engine '{0}' was terminated")]
    Terminated(String),
}

/// Errors from calibration rule parsing and evaluation.
#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("malformed rule: {0}")]
    Syntax(#[from] GrammarError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("rule does not evaluate to a boolean (got '{0}')")]
    NotBoolean(Value),
}

/// Errors from the calibration index.
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("No calibration record with key '{0}'")]
    NotFound(String),

    #[error("Field '{field}' missing from {context}")]
    MissingField { field: String, context: String },

    #[error("Value '{value}' for field '{field}' cannot be stored in an index table")]
    InvalidValue { field: String, value: String },

    #[error("Calibration index is corrupt: {0}")]
    IndexCorruption(String),

    #[error("Rule for field '{field}' could not be evaluated: {source}")]
    RuleEval { field: String, source: RuleError },

    #[error("No suitable calibration found in index '{0}'")]
    NoSuitableCalibration(String),

    #[error("No calibration index of kind '{0}' is configured")]
    UnknownKind(String),

    #[error("Index file '{path}': {message}")]
    Io { path: String, message: String },
}

/// Errors from reading observation headers.
#[derive(Error, Debug, Clone)]
pub enum HeaderError {
    #[error("Could not read header '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Could not parse header '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Object has no file to read a header from")]
    NoFile,

    #[error("No header provider is configured")]
    NoProvider,
}

/// Errors from saving or loading compiled unit artifacts.
#[derive(Error, Debug, Clone)]
pub enum ArtifactError {
    #[error("{0}")]
    Generic(String),
}

/// Errors from loading a pipeline configuration.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Could not read configuration '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Invalid configuration '{path}': {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Calibration(#[from] IndexError),
}
