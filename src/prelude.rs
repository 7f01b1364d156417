//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the kansoku crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.

// Compilation and execution
pub use crate::compiler::Compiler;
pub use crate::interpreter::{
    ExecutionEngine, ExecutionOutcome, FailureClass, RunFailure, RunState, execute,
};
pub use crate::recipe::{CompiledUnit, Recipe};
pub use crate::source::{DirectoryResolver, MemoryResolver, SourceKind, SourceResolver};

// Run context and collaborators
pub use crate::context::{DataObject, DisplayHandle, RunContext, RunFlags, Termination};
pub use crate::dispatch::{CommandEngine, Engine, EngineRegistry, Status};
pub use crate::header::{Header, HeaderProvider, JsonHeaderProvider, TranslationTable};

// Calibration
pub use crate::calibration::{Calibration, CalibrationIndex, RuleSet};

// AST and expression types
pub use crate::ast::{EvaluationTrace, Expression, InputSource, Value};

// Error types
pub use crate::error::{
    CompileError, DispatchError, EvaluationError, ExecutionError, IndexError, PipelineError,
};

// Configuration
pub use crate::config::PipelineConfig;

// Trace formatting
pub use crate::trace::TraceFormatter;

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
