//! Rule-driven selection of historical calibration records.

mod index;
mod rules;

pub use index::{CalibrationIndex, Verification};
pub use rules::{Rule, RuleSet, RuleVerdict};

use crate::error::IndexError;
use crate::header::Header;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

/// An index shared between threads. Writers are serialised by the lock.
pub type SharedIndex = Arc<RwLock<CalibrationIndex>>;

/// The header field used to pick the calibration closest in time.
pub const TIME_FIELD: &str = "ORACTIME";

/// The calibration indices available to a run, keyed by kind (`dark`, `flat`, ...).
///
/// A kind may be overridden for the duration of a run, in which case selection
/// returns the override without consulting the index.
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    indices: BTreeMap<String, CalibrationIndex>,
    overrides: AHashMap<String, String>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, kind: &str, index: CalibrationIndex) -> Self {
        self.indices.insert(kind.to_string(), index);
        self
    }

    /// Opens `<dir>/<kind>.index` with `<dir>/<kind>.rules` for every kind.
    pub fn open_dir(dir: impl AsRef<Path>, kinds: &[String]) -> Result<Self, IndexError> {
        let dir = dir.as_ref();
        let mut calibration = Self::new();
        for kind in kinds {
            let index = CalibrationIndex::open(
                dir.join(format!("{}.index", kind)),
                dir.join(format!("{}.rules", kind)),
            )?;
            calibration.indices.insert(kind.clone(), index);
        }
        Ok(calibration)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    pub fn index(&self, kind: &str) -> Result<&CalibrationIndex, IndexError> {
        self.indices
            .get(kind)
            .ok_or_else(|| IndexError::UnknownKind(kind.to_string()))
    }

    pub fn index_mut(&mut self, kind: &str) -> Result<&mut CalibrationIndex, IndexError> {
        self.indices
            .get_mut(kind)
            .ok_or_else(|| IndexError::UnknownKind(kind.to_string()))
    }

    pub fn set_override(&mut self, kind: &str, file: &str) {
        info!(kind, file, "calibration overridden");
        self.overrides.insert(kind.to_string(), file.to_string());
    }

    pub fn clear_override(&mut self, kind: &str) -> Option<String> {
        self.overrides.remove(kind)
    }

    pub fn override_for(&self, kind: &str) -> Option<&str> {
        self.overrides.get(kind).map(String::as_str)
    }

    /// The calibration of `kind` for an object with the given header.
    pub fn select(&self, kind: &str, header: &Header) -> Result<String, IndexError> {
        if let Some(file) = self.override_for(kind) {
            return Ok(file.to_string());
        }
        self.index(kind)?.nearest_by_time(TIME_FIELD, header)
    }

    /// Files `key` as a calibration of `kind`.
    pub fn file(&mut self, kind: &str, key: &str, header: &Header) -> Result<(), IndexError> {
        self.index_mut(kind)?.add(key, header)
    }
}

impl CalibrationIndex {
    /// Moves the index behind a lock for shared use.
    pub fn into_shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }
}
