//! Locating recipe and primitive source text.
//!
//! The compiler only needs a deterministic answer to "give me the lines of
//! primitive X for instrument Y". Where those lines come from is decided by a
//! [`SourceResolver`].

use crate::error::ResolveError;
use ahash::AHashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether a source is a top-level recipe or an includable primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Recipe,
    Primitive,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Recipe => write!(f, "Recipe"),
            SourceKind::Primitive => write!(f, "Primitive"),
        }
    }
}

/// Looks up recipe and primitive sources by name and instrument.
///
/// Implementations must be deterministic: the same request always returns the
/// same lines for the duration of a compile.
pub trait SourceResolver {
    fn resolve(
        &self,
        name: &str,
        instrument: &str,
        kind: SourceKind,
    ) -> Result<Vec<String>, ResolveError>;
}

/// Resolves sources from directories on disk.
///
/// Search order: every override directory (`<dir>/<name>`), then for each
/// directory of the requested kind the instrument subdirectory
/// (`<dir>/<INSTRUMENT>/<name>`) followed by the directory itself.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    overrides: Vec<PathBuf>,
    recipe_dirs: Vec<PathBuf>,
    primitive_dirs: Vec<PathBuf>,
}

impl DirectoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overrides.push(dir.into());
        self
    }

    pub fn with_recipe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recipe_dirs.push(dir.into());
        self
    }

    pub fn with_primitive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.primitive_dirs.push(dir.into());
        self
    }

    /// All candidate paths for a request, in search order.
    pub fn candidates(&self, name: &str, instrument: &str, kind: SourceKind) -> Vec<PathBuf> {
        let dirs = match kind {
            SourceKind::Recipe => &self.recipe_dirs,
            SourceKind::Primitive => &self.primitive_dirs,
        };
        let instrument_dir = instrument.to_uppercase();

        let mut paths: Vec<PathBuf> = self.overrides.iter().map(|d| d.join(name)).collect();
        for dir in dirs {
            if !instrument_dir.is_empty() {
                paths.push(dir.join(&instrument_dir).join(name));
            }
            paths.push(dir.join(name));
        }
        paths
    }

    fn read_lines(path: &Path) -> Result<Vec<String>, ResolveError> {
        fs::read_to_string(path)
            .map(|text| text.lines().map(str::to_string).collect())
            .map_err(|e| ResolveError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

impl SourceResolver for DirectoryResolver {
    fn resolve(
        &self,
        name: &str,
        instrument: &str,
        kind: SourceKind,
    ) -> Result<Vec<String>, ResolveError> {
        for path in self.candidates(name, instrument, kind) {
            if path.is_file() {
                debug!(name, path = %path.display(), "resolved {} source", kind);
                return Self::read_lines(&path);
            }
        }
        Err(ResolveError::NotFound)
    }
}

/// An in-memory resolver, mostly useful for tests and embedded recipes.
///
/// Instrument-specific entries take precedence over generic ones.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    sources: AHashMap<(SourceKind, Option<String>, String), Vec<String>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipe(mut self, name: &str, text: &str) -> Self {
        self.insert(SourceKind::Recipe, None, name, text);
        self
    }

    pub fn with_primitive(mut self, name: &str, text: &str) -> Self {
        self.insert(SourceKind::Primitive, None, name, text);
        self
    }

    pub fn with_instrument_primitive(mut self, instrument: &str, name: &str, text: &str) -> Self {
        self.insert(SourceKind::Primitive, Some(instrument), name, text);
        self
    }

    pub fn insert(&mut self, kind: SourceKind, instrument: Option<&str>, name: &str, text: &str) {
        self.sources.insert(
            (kind, instrument.map(str::to_uppercase), name.to_string()),
            text.lines().map(str::to_string).collect(),
        );
    }
}

impl SourceResolver for MemoryResolver {
    fn resolve(
        &self,
        name: &str,
        instrument: &str,
        kind: SourceKind,
    ) -> Result<Vec<String>, ResolveError> {
        self.sources
            .get(&(kind, Some(instrument.to_uppercase()), name.to_string()))
            .or_else(|| self.sources.get(&(kind, None, name.to_string())))
            .cloned()
            .ok_or(ResolveError::NotFound)
    }
}
