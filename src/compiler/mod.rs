use crate::error::CompileError;
use crate::recipe::{CompiledUnit, Recipe};
use crate::source::SourceResolver;
use ahash::AHashMap;
use tracing::info;

#[cfg(feature = "debug-tools")]
use std::fs;

mod builder;
pub mod parsing;
mod scaffold;

use builder::Expander;
use parsing::*;
use scaffold::Scaffolder;

/// Primitive inclusions nested deeper than this fail to compile.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Expands recipes into compiled units.
pub struct Compiler {
    resolver: Box<dyn SourceResolver>,
    registry: AHashMap<String, Box<dyn LineParser>>,
    max_depth: usize,
    debug: bool,
}

pub struct CompilerBuilder {
    resolver: Box<dyn SourceResolver>,
    registry: AHashMap<String, Box<dyn LineParser>>,
    max_depth: usize,
    debug: bool,
}

impl CompilerBuilder {
    pub fn new(resolver: impl SourceResolver + 'static) -> Self {
        let mut registry: AHashMap<String, Box<dyn LineParser>> = AHashMap::new();
        register_default_parsers(&mut registry);
        Self {
            resolver: Box::new(resolver),
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
            debug: false,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Emits trace statements around every wrapped engine call.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Makes `alias` behave like the built-in keyword `keyword`. Unknown keywords are ignored.
    pub fn with_keyword_alias(mut self, alias: &str, keyword: &str) -> Self {
        if let Some(parser) = create_parser_by_name(keyword) {
            self.registry.insert(alias.to_string(), parser);
        }
        self
    }

    pub fn with_custom_parser(mut self, parser: Box<dyn LineParser>) -> Self {
        self.registry.insert(parser.keyword().to_string(), parser);
        self
    }

    pub fn build(self) -> Compiler {
        Compiler {
            resolver: self.resolver,
            registry: self.registry,
            max_depth: self.max_depth,
            debug: self.debug,
        }
    }
}

impl Compiler {
    pub fn builder(resolver: impl SourceResolver + 'static) -> CompilerBuilder {
        CompilerBuilder::new(resolver)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Compiles a recipe for its instrument. Nothing is returned unless every
    /// inclusion resolves and every line parses.
    pub fn compile(&self, recipe: &Recipe) -> Result<CompiledUnit, CompileError> {
        let debug = self.debug || recipe.debug;
        let mut expander = Expander::new(
            self.resolver.as_ref(),
            &self.registry,
            &recipe.instrument,
            self.max_depth,
        );
        let expanded = expander.expand_recipe(&recipe.name)?;

        let mut nodes = Scaffolder::new(debug).scaffold(expanded);
        let mut next = 0;
        scaffold::number(&mut nodes, &mut next);

        let unit = CompiledUnit {
            recipe: recipe.name.clone(),
            instrument: recipe.instrument.clone(),
            debug,
            batch: recipe.batch,
            parameters: recipe.parameters.clone(),
            nodes,
        };
        info!(
            recipe = %unit.recipe,
            instrument = %unit.instrument,
            statements = next,
            "compiled recipe"
        );

        #[cfg(feature = "debug-tools")]
        self.write_debug_file(&unit);

        Ok(unit)
    }

    #[cfg(feature = "debug-tools")]
    fn sanitize_filename(&self, name: &str) -> String {
        name.chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
    }

    #[cfg(feature = "debug-tools")]
    fn write_debug_file(&self, unit: &CompiledUnit) {
        let path = format!(
            "tmp/unit_{}_{}.listing",
            self.sanitize_filename(&unit.recipe),
            self.sanitize_filename(&unit.instrument)
        );
        if let Err(e) = fs::create_dir_all("tmp").and_then(|_| fs::write(&path, unit.listing())) {
            tracing::warn!(path = %path, "could not write debug listing: {}", e);
        }
    }
}
