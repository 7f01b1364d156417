use super::{Expression, ObjectField, ObjectRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a compiled statement came from: the recipe or primitive name and a 1-based line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub source: String,
    pub line: usize,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// A statement of a compiled unit together with its position in the flattened listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub position: usize,
    pub origin: Origin,
    pub statement: Statement,
}

impl Node {
    pub fn new(origin: Origin, statement: Statement) -> Self {
        Self {
            position: 0,
            origin,
            statement,
        }
    }

    /// Depth-first visit of this node and every nested node, in execution order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        match &self.statement {
            Statement::Block { body, .. } => body.iter().for_each(|n| n.walk(visit)),
            Statement::Conditional { then, .. } => then.walk(visit),
            _ => {}
        }
    }
}

/// The statements the compiler emits and the interpreter walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Comments, documentation and blank lines, kept verbatim. No-op at run time.
    Raw(String),
    Assign {
        target: Target,
        value: Expression,
    },
    EngineCall(EngineCall),
    /// Debug trace emitted around a wrapped engine call.
    Trace {
        phase: TracePhase,
        call: CallSite,
        slot: String,
    },
    /// Raises a pipeline error unless the status read from `source` is OK.
    StatusCheck {
        source: StatusSource,
    },
    Block {
        kind: BlockKind,
        body: Vec<Node>,
    },
    /// A single statement guarded by a condition. The inner statement is never wrapped.
    Conditional {
        condition: Expression,
        then: Box<Node>,
    },
    Print(Expression),
    Warn(Expression),
    Throw(Expression),
    Display(Expression),
    /// Files the current frame as a calibration of `kind`.
    Index {
        kind: String,
    },
    Sync(ObjectRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCall {
    pub engine: String,
    pub action: String,
    pub args: Option<Expression>,
    pub capture: Capture,
}

impl EngineCall {
    pub fn site(&self) -> CallSite {
        CallSite {
            engine: self.engine.clone(),
            action: self.action.clone(),
            args: self.args.clone(),
        }
    }
}

/// What happens to the status returned by an engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capture {
    /// A bare call the scaffold pass has not wrapped yet.
    Unguarded,
    /// Stored in a block-scoped local created by the scaffold pass.
    Local(String),
    /// Stored in a user variable; the recipe checks it itself.
    Variable(String),
    /// Stored in the pipeline status variable.
    Status,
    /// Discarded (calls under a conditional).
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    pub engine: String,
    pub action: String,
    pub args: Option<Expression>,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.engine, self.action)?;
        if let Some(args) = &self.args {
            write!(f, " {}", args)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TracePhase {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSource {
    Local(String),
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Variable(String),
    Status,
    Object { object: ObjectRef, field: ObjectField },
    Calibration { kind: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Variable(name) => write!(f, "{}", name),
            Target::Status => write!(f, "status"),
            Target::Object { object, field } => match field {
                ObjectField::File => write!(f, "{}.file", object.prefix()),
                ObjectField::Header(key) => write!(f, "{}.hdr.{}", object.prefix(), key),
                ObjectField::UserHeader(key) => write!(f, "{}.uhdr.{}", object.prefix(), key),
            },
            Target::Calibration { kind } => write!(f, "cal.{}", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    /// An expanded primitive. `arguments` evaluates to the raw `key=value` string.
    Primitive {
        name: String,
        arguments: Expression,
        depth: usize,
    },
    /// The scope introduced around a wrapped engine call.
    Guard,
}

impl Statement {
    /// One-line rendering used by unit listings.
    pub fn describe(&self) -> String {
        match self {
            Statement::Raw(text) => text.clone(),
            Statement::Assign { target, value } => format!("{} = {}", target, value),
            Statement::EngineCall(call) => {
                let site = call.site();
                match &call.capture {
                    Capture::Unguarded | Capture::Ignore => format!("obey {}", site),
                    Capture::Local(slot) => format!("{} := obey {}", slot, site),
                    Capture::Variable(name) => format!("{} = obey {}", name, site),
                    Capture::Status => format!("status = obey {}", site),
                }
            }
            Statement::Trace { phase, call, slot } => match phase {
                TracePhase::Before => format!("trace -> {}", call),
                TracePhase::After => format!("trace <- {} [{}]", call, slot),
            },
            Statement::StatusCheck { source } => match source {
                StatusSource::Local(slot) => format!("check {} == OK", slot),
                StatusSource::Status => "check status == OK".to_string(),
            },
            Statement::Block { kind, .. } => match kind {
                BlockKind::Primitive {
                    name, arguments, ..
                } => format!("{{ {} {}", name, arguments),
                BlockKind::Guard => "{ guard".to_string(),
            },
            Statement::Conditional { condition, then } => {
                format!("if {} then {}", condition, then.statement.describe())
            }
            Statement::Print(e) => format!("print {}", e),
            Statement::Warn(e) => format!("warn {}", e),
            Statement::Throw(e) => format!("throw {}", e),
            Statement::Display(e) => format!("display {}", e),
            Statement::Index { kind } => format!("index {}", kind),
            Statement::Sync(object) => format!("sync {}", object.prefix()),
        }
    }
}
