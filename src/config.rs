//! Pipeline configuration loaded from a JSON file.

use crate::calibration::Calibration;
use crate::compiler::{Compiler, DEFAULT_MAX_DEPTH};
use crate::context::RunFlags;
use crate::dispatch::{CommandEngine, EngineRegistry};
use crate::error::ConfigError;
use crate::header::JsonHeaderProvider;
use crate::source::DirectoryResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A command line used to start an engine for each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Searched before the recipe and primitive directories.
    #[serde(default)]
    pub override_dirs: Vec<PathBuf>,

    #[serde(default = "default_recipe_dirs")]
    pub recipe_dirs: Vec<PathBuf>,

    #[serde(default = "default_primitive_dirs")]
    pub primitive_dirs: Vec<PathBuf>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub batch: bool,

    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,

    #[serde(default = "default_calibration_dir")]
    pub calibration_dir: PathBuf,

    /// Calibration kinds with an index in `calibration_dir`.
    #[serde(default)]
    pub calibration_kinds: Vec<String>,

    /// Directory holding `<file>.json` headers.
    #[serde(default = "default_header_dir")]
    pub header_dir: PathBuf,

    #[serde(default)]
    pub engines: BTreeMap<String, EngineConfig>,

    /// Keyword aliases accepted by the compiler, alias to built-in keyword.
    #[serde(default)]
    pub keyword_aliases: BTreeMap<String, String>,
}

fn default_recipe_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("recipes")]
}

fn default_primitive_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("primitives")]
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_diagnostics_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_calibration_dir() -> PathBuf {
    PathBuf::from("calibration")
}

fn default_header_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            override_dirs: Vec::new(),
            recipe_dirs: default_recipe_dirs(),
            primitive_dirs: default_primitive_dirs(),
            max_depth: default_max_depth(),
            debug: false,
            batch: false,
            diagnostics_dir: default_diagnostics_dir(),
            calibration_dir: default_calibration_dir(),
            calibration_kinds: Vec::new(),
            header_dir: default_header_dir(),
            engines: BTreeMap::new(),
            keyword_aliases: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&path.display().to_string(), &content)
    }

    pub fn from_json(name: &str, content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn flags(&self) -> RunFlags {
        RunFlags {
            debug: self.debug,
            batch: self.batch,
        }
    }

    pub fn resolver(&self) -> DirectoryResolver {
        let resolver = self
            .override_dirs
            .iter()
            .fold(DirectoryResolver::new(), |r, d| r.with_override_dir(d));
        let resolver = self
            .recipe_dirs
            .iter()
            .fold(resolver, |r, d| r.with_recipe_dir(d));
        self.primitive_dirs
            .iter()
            .fold(resolver, |r, d| r.with_primitive_dir(d))
    }

    pub fn compiler(&self) -> Compiler {
        self.keyword_aliases
            .iter()
            .fold(Compiler::builder(self.resolver()), |b, (alias, keyword)| {
                b.with_keyword_alias(alias, keyword)
            })
            .with_max_depth(self.max_depth)
            .with_debug(self.debug)
            .build()
    }

    pub fn calibration(&self) -> Result<Calibration, ConfigError> {
        Ok(Calibration::open_dir(
            &self.calibration_dir,
            &self.calibration_kinds,
        )?)
    }

    pub fn engines(&self) -> EngineRegistry {
        self.engines
            .iter()
            .fold(EngineRegistry::new(), |registry, (name, engine)| {
                registry.with_engine(
                    name,
                    CommandEngine::new(name, &engine.program).with_args(engine.args.clone()),
                )
            })
    }

    pub fn header_provider(&self) -> JsonHeaderProvider {
        JsonHeaderProvider::new(&self.header_dir)
    }
}
