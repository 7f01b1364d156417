use crate::ast::{Node, Statement, Value};
use crate::error::ArtifactError;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// The fully expanded, scaffolded form of a recipe.
///
/// Every node, nested ones included, carries its position in the flattened
/// listing; `listing_lines()[n]` renders the node at position `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub recipe: String,
    pub instrument: String,
    pub debug: bool,
    /// Suppresses displays when set, in addition to the run flag.
    pub batch: bool,
    pub parameters: BTreeMap<String, Value>,
    pub nodes: Vec<Node>,
}

impl CompiledUnit {
    /// Number of statements in the flattened listing.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.walk(|_, _| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visits every node in listing order together with its nesting depth.
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&'a Node, usize)) {
        fn descend<'a>(nodes: &'a [Node], depth: usize, visit: &mut impl FnMut(&'a Node, usize)) {
            for node in nodes {
                visit(node, depth);
                match &node.statement {
                    Statement::Block { body, .. } => descend(body, depth + 1, visit),
                    Statement::Conditional { then, .. } => {
                        descend(std::slice::from_ref(then.as_ref()), depth + 1, visit)
                    }
                    _ => {}
                }
            }
        }
        descend(&self.nodes, 0, &mut visit);
    }

    /// Every node in listing order.
    pub fn flatten(&self) -> Vec<&Node> {
        let mut nodes = Vec::new();
        self.walk(|node, _| nodes.push(node));
        nodes
    }

    /// One line per statement: position, indentation by nesting depth, rendering.
    pub fn listing_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.walk(|node, depth| {
            lines.push(format!(
                "{:>5}  {}{}",
                node.position,
                "    ".repeat(depth),
                node.statement.describe()
            ))
        });
        lines
    }

    pub fn listing(&self) -> String {
        let mut out = format!("# {} ({})\n", self.recipe, self.instrument);
        for line in self.listing_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// The listing lines within `radius` positions of `position`.
    pub fn window(&self, position: usize, radius: usize) -> Vec<String> {
        let lines = self.listing_lines();
        let start = position.saturating_sub(radius);
        let end = (position + radius + 1).min(lines.len());
        lines.get(start..end).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// Saves the compiled unit to a file using the bincode format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let bytes = encode_to_vec(self, standard())
            .map_err(|e| ArtifactError::Generic(format!("Serialization failed: {}", e)))?;
        let mut file = fs::File::create(path).map_err(|e| {
            ArtifactError::Generic(format!("Could not create file '{}': {}", path.display(), e))
        })?;
        file.write_all(&bytes).map_err(|e| {
            ArtifactError::Generic(format!("Could not write to file '{}': {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Loads a compiled unit from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).map_err(|e| {
            ArtifactError::Generic(format!("Could not open file '{}': {}", path.display(), e))
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            ArtifactError::Generic(format!("Could not read from file '{}': {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Deserializes a compiled unit from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        decode_from_slice(bytes, standard())
            .map(|(unit, _)| unit)
            .map_err(|e| ArtifactError::Generic(format!("Deserialization failed: {}", e)))
    }
}
