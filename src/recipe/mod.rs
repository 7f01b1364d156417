pub mod artifact;

pub use artifact::*;

use crate::ast::Value;
use std::collections::BTreeMap;

/// A named top-level workflow for one instrument, plus its run parameters.
///
/// Identity is `(name, instrument)`. Parameters are visible to the top-level
/// recipe scope through `arg(NAME)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub name: String,
    pub instrument: String,
    pub parameters: BTreeMap<String, Value>,
    pub debug: bool,
    pub batch: bool,
}

impl Recipe {
    pub fn new(name: &str, instrument: &str) -> Self {
        Self {
            name: name.to_string(),
            instrument: instrument.to_string(),
            parameters: BTreeMap::new(),
            debug: false,
            batch: false,
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }
}
