//! The engine dispatcher: named compute engines invoked with an action and an argument string.

use crate::error::DispatchError;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// A status code returned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    /// Returned by an engine that was killed on user request.
    pub const TERMINATED: Status = Status(-2);

    pub fn is_ok(self) -> bool {
        self == Status::OK
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Status::OK => write!(f, "OK"),
            Status::TERMINATED => write!(f, "TERMINATED"),
            Status(code) => write!(f, "{}", code),
        }
    }
}

/// A long-running compute engine.
///
/// A call blocks until the engine returns a status; timeouts are the engine's concern.
pub trait Engine: Send {
    fn obey(&mut self, action: &str, args: &str) -> Result<Status, DispatchError>;
}

/// The engines available to a run, by name.
#[derive(Default)]
pub struct EngineRegistry {
    engines: AHashMap<String, Box<dyn Engine>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, engine: impl Engine + 'static) {
        self.engines.insert(name.to_string(), Box::new(engine));
    }

    pub fn with_engine(mut self, name: &str, engine: impl Engine + 'static) -> Self {
        self.register(name, engine);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Registered engine names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn invoke(&mut self, engine: &str, action: &str, args: &str) -> Result<Status, DispatchError> {
        let target = self
            .engines
            .get_mut(engine)
            .ok_or_else(|| DispatchError::UnknownEngine(engine.to_string()))?;
        debug!(engine, action, args, "obey");
        target.obey(action, args)
    }
}

/// Runs `<program> [base args] <action> <args...>` per call and maps the exit code to a status.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    name: String,
    program: PathBuf,
    base_args: Vec<String>,
}

impl CommandEngine {
    pub fn new(name: &str, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Engine for CommandEngine {
    fn obey(&mut self, action: &str, args: &str) -> Result<Status, DispatchError> {
        let status = Command::new(&self.program)
            .args(&self.base_args)
            .arg(action)
            .args(args.split_whitespace())
            .status()
            .map_err(|e| DispatchError::Unavailable {
                engine: self.name.clone(),
                message: e.to_string(),
            })?;
        // No exit code means the process was killed by a signal.
        Ok(status.code().map(Status).unwrap_or(Status::TERMINATED))
    }
}
