//! # Execution engine
//!
//! Runs compiled units against a [`RunContext`]. Any failure is fatal to the
//! run: the engine reports it with the failing statement's position, classifies
//! it, and never resumes.

use crate::ast::Origin;
use crate::compiler::Compiler;
use crate::context::RunContext;
use crate::dispatch::Status;
use crate::error::{CompileError, DispatchError, EvaluationError, ExecutionError};
use crate::recipe::{CompiledUnit, Recipe};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

mod arguments;
mod runner;
mod scope;

pub use arguments::parse_arguments;
use runner::Interpreter;

/// Compiled lines shown on each side of a structural failure.
pub const WINDOW_RADIUS: usize = 5;

/// The result of a run that completed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Terminal value of the pipeline status.
    pub status: Status,
    pub statements: usize,
    pub engine_calls: usize,
    /// Debug trace lines emitted around engine calls.
    pub trace: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// An engine call or a status assignment yielded a non-OK status.
    Pipeline,
    /// A defect in the recipe: undefined names, type errors, bad arguments.
    Structural,
    /// The run was terminated on request.
    Terminated,
    /// The recipe raised a failure itself.
    Thrown,
    Calibration,
    Display,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureClass::Pipeline => "pipeline",
            FailureClass::Structural => "structural",
            FailureClass::Terminated => "terminated",
            FailureClass::Thrown => "recipe",
            FailureClass::Calibration => "calibration",
            FailureClass::Display => "display",
        };
        write!(f, "{}", name)
    }
}

impl FailureClass {
    pub fn of(error: &ExecutionError) -> Self {
        match error {
            ExecutionError::Pipeline(_) | ExecutionError::Dispatch(DispatchError::Unavailable { .. }) => {
                FailureClass::Pipeline
            }
            ExecutionError::Terminated | ExecutionError::Dispatch(DispatchError::Terminated(_)) => {
                FailureClass::Terminated
            }
            ExecutionError::Thrown(_) => FailureClass::Thrown,
            ExecutionError::Calibration(_)
            | ExecutionError::Evaluation(EvaluationError::Calibration { .. }) => {
                FailureClass::Calibration
            }
            ExecutionError::Display(_) => FailureClass::Display,
            ExecutionError::NotCompiled
            | ExecutionError::Evaluation(_)
            | ExecutionError::Dispatch(DispatchError::UnknownEngine(_))
            | ExecutionError::MalformedArguments { .. }
            | ExecutionError::Header(_) => FailureClass::Structural,
        }
    }
}

/// A failed run.
#[derive(Error, Debug, Clone)]
#[error("{report}")]
pub struct RunFailure {
    pub error: ExecutionError,
    pub class: FailureClass,
    /// Position of the failing statement in the unit listing.
    pub position: Option<usize>,
    pub origin: Option<Origin>,
    pub report: String,
    /// Listing lines around the failing statement, for structural failures.
    pub window: Vec<String>,
    /// Where the full listing was written, in debug mode.
    pub diagnostic: Option<PathBuf>,
}

impl RunFailure {
    fn not_compiled() -> Self {
        let error = ExecutionError::NotCompiled;
        Self {
            report: error.to_string(),
            class: FailureClass::of(&error),
            error,
            position: None,
            origin: None,
            window: Vec::new(),
            diagnostic: None,
        }
    }
}

/// Runs a compiled unit to completion or to its first failure.
pub fn execute(unit: &CompiledUnit, ctx: &mut RunContext) -> Result<ExecutionOutcome, RunFailure> {
    let debug = unit.debug || ctx.flags.debug;
    let diagnostics_dir = ctx.diagnostics_dir.clone();

    let mut interpreter = Interpreter::new(unit, ctx);
    match interpreter.run() {
        Ok(status) => {
            info!(
                recipe = %unit.recipe,
                statements = interpreter.statements,
                engine_calls = interpreter.engine_calls,
                "recipe completed with status {}",
                status
            );
            Ok(ExecutionOutcome {
                status: interpreter.status(),
                statements: interpreter.statements,
                engine_calls: interpreter.engine_calls,
                trace: std::mem::take(&mut interpreter.trace),
            })
        }
        Err(error) => {
            let node = interpreter.current;
            Err(report_failure(
                unit,
                error,
                node.map(|n| n.position),
                node.map(|n| n.origin.clone()),
                debug.then_some(diagnostics_dir),
            ))
        }
    }
}

fn report_failure(
    unit: &CompiledUnit,
    error: ExecutionError,
    position: Option<usize>,
    origin: Option<Origin>,
    diagnostics_dir: Option<PathBuf>,
) -> RunFailure {
    let class = FailureClass::of(&error);
    let location = match (&position, &origin) {
        (Some(p), Some(o)) => format!("statement {} ({})", p, o),
        _ => "an unknown statement".to_string(),
    };
    let report = match class {
        FailureClass::Terminated => format!(
            "Recipe '{}' was terminated by user request at {}",
            unit.recipe, location
        ),
        _ => format!(
            "Recipe '{}' failed with a {} error at {}: {}",
            unit.recipe, class, location, error
        ),
    };
    error!("{}", report);

    let window = match (class, position) {
        (FailureClass::Structural, Some(p)) => {
            let window = unit.window(p, WINDOW_RADIUS);
            for line in &window {
                error!("{}", line);
            }
            window
        }
        _ => Vec::new(),
    };

    let diagnostic = diagnostics_dir.and_then(|dir| {
        let path = dir.join(format!(
            "kansoku_{}_{}.listing",
            unit.recipe, unit.instrument
        ));
        let written = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, unit.listing()));
        match written {
            Ok(()) => {
                info!(path = %path.display(), "compiled listing written");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), "could not write compiled listing: {}", e);
                None
            }
        }
    });

    RunFailure {
        error,
        class,
        position,
        origin,
        report,
        window,
        diagnostic,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Compiling,
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// Compiles and runs recipes one observation at a time.
///
/// A compiled unit is consumed by the run that uses it; every run needs a fresh
/// `prepare` (or `load`). Retrying is the caller's decision.
pub struct ExecutionEngine {
    compiler: Compiler,
    state: RunState,
    unit: Option<CompiledUnit>,
}

impl ExecutionEngine {
    pub fn new(compiler: Compiler) -> Self {
        Self {
            compiler,
            state: RunState::Idle,
            unit: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn have_compiled(&self) -> bool {
        self.state == RunState::Ready && self.unit.is_some()
    }

    /// The unit waiting to be run, if any.
    pub fn unit(&self) -> Option<&CompiledUnit> {
        self.unit.as_ref()
    }

    /// Compiles `recipe` for the next run.
    pub fn prepare(&mut self, recipe: &Recipe) -> Result<&CompiledUnit, CompileError> {
        self.state = RunState::Compiling;
        self.unit = None;
        match self.compiler.compile(recipe) {
            Ok(unit) => {
                self.state = RunState::Ready;
                let unit = self.unit.insert(unit);
                Ok(&*unit)
            }
            Err(e) => {
                self.state = RunState::Failed;
                Err(e)
            }
        }
    }

    /// Uses a previously compiled unit for the next run.
    pub fn load(&mut self, unit: CompiledUnit) {
        self.unit = Some(unit);
        self.state = RunState::Ready;
    }

    /// Runs the prepared unit. Without one this fails with `NotCompiled` and touches nothing.
    pub fn run(&mut self, ctx: &mut RunContext) -> Result<ExecutionOutcome, RunFailure> {
        if self.state != RunState::Ready {
            return Err(RunFailure::not_compiled());
        }
        let Some(unit) = self.unit.take() else {
            return Err(RunFailure::not_compiled());
        };
        self.state = RunState::Running;
        let result = execute(&unit, ctx);
        self.state = match result {
            Ok(_) => RunState::Succeeded,
            Err(_) => RunState::Failed,
        };
        result
    }
}
