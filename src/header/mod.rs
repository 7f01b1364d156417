//! Observation headers, header providers and per-instrument translation tables.

mod provider;
mod translation;

pub use provider::{HeaderProvider, JsonHeaderProvider, MemoryHeaderProvider};
pub use translation::{TranslationRegistry, TranslationTable, Translator};

use crate::ast::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A header: key/value metadata attached to an observation, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header {
    entries: BTreeMap<String, Value>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Copies every entry of `other` into this header, overwriting duplicates.
    pub fn merge(&mut self, other: &Header) {
        for (key, value) in other.iter() {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// A new header holding this header's entries overlaid with `other`'s.
    pub fn overlaid(&self, other: &Header) -> Header {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Header {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
