use super::Header;
use crate::ast::Value;
use crate::error::HeaderError;
use ahash::AHashMap;
use std::fs;
use std::path::PathBuf;

/// Reads the header of an observation file.
pub trait HeaderProvider {
    fn read_header(&self, file: &str) -> Result<Header, HeaderError>;
}

/// Reads headers stored as flat JSON objects in `<dir>/<file>.json`.
///
/// Nested objects and arrays are kept as their JSON text.
#[derive(Debug, Clone)]
pub struct JsonHeaderProvider {
    dir: PathBuf,
}

impl JsonHeaderProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Parse a header from JSON text.
    pub fn parse(path: &str, content: &str) -> Result<Header, HeaderError> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)
            .map_err(|e| HeaderError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(raw
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value)))
            .collect())
    }
}

impl HeaderProvider for JsonHeaderProvider {
    fn read_header(&self, file: &str) -> Result<Header, HeaderError> {
        let path = self.dir.join(format!("{}.json", file));
        let display = path.display().to_string();
        let content = fs::read_to_string(&path).map_err(|e| HeaderError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?;
        Self::parse(&display, &content)
    }
}

/// Serves headers from memory. Unknown files yield an empty header.
#[derive(Debug, Clone, Default)]
pub struct MemoryHeaderProvider {
    headers: AHashMap<String, Header>,
}

impl MemoryHeaderProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, file: &str, header: Header) -> Self {
        self.headers.insert(file.to_string(), header);
        self
    }

    pub fn insert(&mut self, file: &str, header: Header) {
        self.headers.insert(file.to_string(), header);
    }
}

impl HeaderProvider for MemoryHeaderProvider {
    fn read_header(&self, file: &str) -> Result<Header, HeaderError> {
        Ok(self.headers.get(file).cloned().unwrap_or_default())
    }
}
