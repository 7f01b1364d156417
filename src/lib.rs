//! # Kansoku - Recipe Compilation and Execution for Observation Reduction
//!
//! **Kansoku** drives the automated reduction of telescope instrument data. For
//! each incoming observation it expands a named recipe, and the primitives the
//! recipe includes, into a single executable unit, runs that unit against the
//! observation's context, and dispatches processing steps to external compute
//! engines.
//!
//! ## Core Workflow
//!
//! 1.  **Resolve sources**: a [`source::SourceResolver`] finds recipe and primitive text,
//!     from directories on disk or from memory.
//! 2.  **Compile**: [`compiler::Compiler`] recursively expands `_PRIMITIVE_` inclusions
//!     (bounded depth) and wraps every bare engine call in a status check, producing a
//!     [`recipe::CompiledUnit`].
//! 3.  **Execute**: [`interpreter::ExecutionEngine`] runs the unit against a
//!     [`context::RunContext`]: the frame and group, the calibration indices, the
//!     engine registry and the run flags. Any failure aborts the run and is reported
//!     with its position in the unit.
//! 4.  **Calibrate**: [`calibration::CalibrationIndex`] selects the historical calibration
//!     closest in time whose rules accept the observation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kansoku::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let resolver = MemoryResolver::new()
//!     .with_recipe("REDUCE_DARK", "_SUBTRACT_BIAS_ BIAS=bias_01\nindex dark")
//!     .with_primitive(
//!         "_SUBTRACT_BIAS_",
//!         "bias = arg(BIAS)\nobey kappa sub \"in=${frm.file} bias=${bias}\"",
//!     );
//!
//! let compiler = Compiler::builder(resolver).build();
//! let mut engine = ExecutionEngine::new(compiler);
//! engine.prepare(&Recipe::new("REDUCE_DARK", "UFTI"))?;
//!
//! let rules = RuleSet::new().with_rule("ORACTIME", "")?;
//! let calibration = Calibration::new()
//!     .with_index("dark", CalibrationIndex::with_rules("dark", rules));
//! let mut ctx = RunContext::new(DataObject::new("f20240101_00001"), DataObject::default())
//!     .with_calibration(calibration)
//!     .with_engines(EngineRegistry::new().with_engine("kappa", CommandEngine::new("kappa", "kappa")));
//!
//! let outcome = engine.run(&mut ctx)?;
//! println!("Recipe finished with status {}", outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod calibration;
pub mod compiler;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod header;
pub mod interpreter;
pub mod prelude;
pub mod recipe;
pub mod source;
pub mod trace;
