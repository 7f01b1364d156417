use super::parsing::{LineParser, LineParsers};
use crate::ast::grammar::parse_template;
use crate::ast::{BlockKind, Node, Origin, Statement};
use crate::error::{CompileError, ResolveError};
use crate::source::{SourceKind, SourceResolver};
use ahash::AHashMap;
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(_[A-Z0-9][A-Z0-9_]*_)(?:\s+(.*))?$").expect("directive pattern is valid")
});

/// Recursively expands primitive inclusion directives into nested blocks.
///
/// Resolved sources are memoised for the lifetime of the expander, which is a
/// single compile.
pub(super) struct Expander<'a> {
    resolver: &'a dyn SourceResolver,
    parsers: LineParsers<'a>,
    instrument: &'a str,
    max_depth: usize,
    source_cache: AHashMap<(SourceKind, String), Vec<String>>,
    chain: Vec<String>,
}

impl<'a> Expander<'a> {
    pub(super) fn new(
        resolver: &'a dyn SourceResolver,
        registry: &'a AHashMap<String, Box<dyn LineParser>>,
        instrument: &'a str,
        max_depth: usize,
    ) -> Self {
        Self {
            resolver,
            parsers: LineParsers::new(registry),
            instrument,
            max_depth,
            source_cache: AHashMap::new(),
            chain: Vec::new(),
        }
    }

    /// Expands a recipe at depth 0.
    pub(super) fn expand_recipe(&mut self, name: &str) -> Result<Vec<Node>, CompileError> {
        self.chain.push(name.to_string());
        let nodes = self.expand(name, SourceKind::Recipe, 0);
        self.chain.pop();
        nodes
    }

    fn source(&mut self, name: &str, kind: SourceKind) -> Result<Vec<String>, CompileError> {
        let key = (kind, name.to_string());
        if let Some(cached) = self.source_cache.get(&key) {
            return Ok(cached.clone());
        }
        let lines = self
            .resolver
            .resolve(name, self.instrument, kind)
            .map_err(|e| match e {
                ResolveError::NotFound => CompileError::NotFound {
                    kind,
                    name: name.to_string(),
                    instrument: self.instrument.to_string(),
                },
                other => CompileError::Resolver(other.to_string()),
            })?;
        self.source_cache.insert(key, lines.clone());
        Ok(lines)
    }

    fn expand(
        &mut self,
        name: &str,
        kind: SourceKind,
        depth: usize,
    ) -> Result<Vec<Node>, CompileError> {
        let lines = self.source(name, kind)?;
        let mut nodes = Vec::with_capacity(lines.len());
        let mut in_documentation = false;

        for (index, raw) in lines.iter().enumerate() {
            let origin = Origin {
                source: name.to_string(),
                line: index + 1,
            };
            let line = raw.trim();

            // Documentation blocks run from `=word` to `=cut` and are never scanned.
            if in_documentation || Self::opens_documentation(line) {
                in_documentation = !line.starts_with("=cut");
                nodes.push(Node::new(origin, Statement::Raw(raw.clone())));
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                nodes.push(Node::new(origin, Statement::Raw(raw.clone())));
                continue;
            }

            if let Some(caps) = DIRECTIVE.captures(line) {
                let primitive = caps.get(1).map_or("", |m| m.as_str()).to_string();
                let arguments = caps.get(2).map_or("", |m| m.as_str().trim());
                nodes.push(self.include(origin, primitive, arguments, depth + 1)?);
                continue;
            }

            let statement = self.parsers.parse_line(line).map_err(|e| CompileError::Syntax {
                source_name: name.to_string(),
                line: index + 1,
                message: e.to_string(),
            })?;
            nodes.push(Self::with_origin(origin, statement));
        }
        Ok(nodes)
    }

    fn opens_documentation(line: &str) -> bool {
        let mut chars = line.chars();
        chars.next() == Some('=') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
    }

    /// Conditionals carry their inner statement as a node; it shares the line's origin.
    fn with_origin(origin: Origin, statement: Statement) -> Node {
        let statement = match statement {
            Statement::Conditional { condition, mut then } => {
                then.origin = origin.clone();
                Statement::Conditional { condition, then }
            }
            other => other,
        };
        Node::new(origin, statement)
    }

    fn include(
        &mut self,
        origin: Origin,
        primitive: String,
        arguments: &str,
        depth: usize,
    ) -> Result<Node, CompileError> {
        if depth > self.max_depth {
            let mut chain = self.chain.clone();
            chain.push(primitive.clone());
            return Err(CompileError::RecursionLimitExceeded {
                primitive,
                depth,
                limit: self.max_depth,
                chain,
            });
        }
        let arguments = parse_template(arguments).map_err(|e| CompileError::Syntax {
            source_name: origin.source.clone(),
            line: origin.line,
            message: e.to_string(),
        })?;
        trace!(primitive = %primitive, depth, "including primitive");

        self.chain.push(primitive.clone());
        let body = self.expand(&primitive, SourceKind::Primitive, depth);
        self.chain.pop();

        Ok(Node::new(
            origin,
            Statement::Block {
                kind: BlockKind::Primitive {
                    name: primitive,
                    arguments,
                    depth,
                },
                body: body?,
            },
        ))
    }
}
