//! Tests for compiled unit artifacts, source resolution, configuration and engines.
mod common;
use common::*;
use kansoku::error::{ConfigError, ResolveError};
use kansoku::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn dark_unit() -> CompiledUnit {
    Compiler::builder(dark_resolver())
        .build()
        .compile(&Recipe::new("REDUCE_DARK", "UFTI").with_parameter("NIGHT", 20240101.0))
        .expect("Failed to compile REDUCE_DARK")
}

fn write(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

#[cfg(test)]
mod artifact_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reduce_dark.kso");
        let unit = dark_unit();

        unit.save(&path).expect("Failed to save unit");
        let loaded = CompiledUnit::from_file(&path).expect("Failed to load unit");

        assert_eq!(loaded, unit);
        assert_eq!(loaded.listing(), unit.listing());
        assert_eq!(loaded.parameters["NIGHT"], Value::Number(20240101.0));
    }

    #[test]
    fn test_loading_rejects_bad_input() {
        assert!(CompiledUnit::from_bytes(b"garbage").is_err());
        let dir = TempDir::new().unwrap();
        let err = CompiledUnit::from_file(dir.path().join("absent.kso")).unwrap_err();
        assert!(err.to_string().contains("absent.kso"));
    }

    #[test]
    fn test_loaded_unit_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reduce_dark.kso");
        dark_unit().save(&path).unwrap();

        let log = CallLog::default();
        let mut engine = ExecutionEngine::new(Compiler::builder(MemoryResolver::new()).build());
        engine.load(CompiledUnit::from_file(&path).unwrap());
        let mut ctx = recording_context("f001", Header::new(), RecordingEngine::new("kappa", &log));
        let outcome = engine.run(&mut ctx).expect("loaded unit should run");

        assert_eq!(outcome.engine_calls, 1);
        assert_eq!(log.calls()[0].args, "in=f001 bias=bias_01");
    }

    #[test]
    fn test_window_is_clamped_to_listing() {
        let unit = dark_unit();
        let lines = unit.listing_lines();
        assert_eq!(lines.len(), unit.len());
        assert_eq!(unit.len(), 7);

        assert_eq!(unit.window(0, 5), lines[0..6].to_vec());
        assert_eq!(unit.window(6, 5), lines[1..7].to_vec());
        assert_eq!(unit.window(3, 1), lines[2..5].to_vec());
        assert!(unit.window(100, 5).is_empty());
    }

    #[test]
    fn test_listing_header_and_indentation() {
        let listing = dark_unit().listing();
        let mut lines = listing.lines();
        assert_eq!(lines.next(), Some("# REDUCE_DARK (UFTI)"));
        assert!(lines.next().is_some_and(|l| l.starts_with("    0  ")));
        assert!(lines.next().is_some_and(|l| l.starts_with("    1  ")));
        assert!(lines.next().is_some_and(|l| l.starts_with("    2      ")));
    }
}

#[cfg(test)]
mod resolver_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_order() {
        let dir = TempDir::new().unwrap();
        let overrides = dir.path().join("local");
        let primitives = dir.path().join("primitives");
        let resolver = DirectoryResolver::new()
            .with_override_dir(&overrides)
            .with_primitive_dir(&primitives);

        assert_eq!(
            resolver.candidates("_FLAT_", "ufti", SourceKind::Primitive),
            vec![
                overrides.join("_FLAT_"),
                primitives.join("UFTI").join("_FLAT_"),
                primitives.join("_FLAT_"),
            ]
        );

        write(&primitives.join("_FLAT_"), "print \"generic\"");
        assert_eq!(
            resolver.resolve("_FLAT_", "UFTI", SourceKind::Primitive).unwrap(),
            vec!["print \"generic\"".to_string()]
        );

        write(&primitives.join("UFTI").join("_FLAT_"), "print \"ufti\"");
        assert_eq!(
            resolver.resolve("_FLAT_", "UFTI", SourceKind::Primitive).unwrap(),
            vec!["print \"ufti\"".to_string()]
        );
        assert_eq!(
            resolver.resolve("_FLAT_", "IRCAM", SourceKind::Primitive).unwrap(),
            vec!["print \"generic\"".to_string()]
        );

        write(&overrides.join("_FLAT_"), "print \"local\"");
        assert_eq!(
            resolver.resolve("_FLAT_", "UFTI", SourceKind::Primitive).unwrap(),
            vec!["print \"local\"".to_string()]
        );
    }

    #[test]
    fn test_kinds_use_separate_directories() {
        let dir = TempDir::new().unwrap();
        let resolver = DirectoryResolver::new()
            .with_recipe_dir(dir.path().join("recipes"))
            .with_primitive_dir(dir.path().join("primitives"));
        write(&dir.path().join("recipes").join("REDUCE_DARK"), REDUCE_DARK);

        assert!(resolver.resolve("REDUCE_DARK", "UFTI", SourceKind::Recipe).is_ok());
        assert!(matches!(
            resolver.resolve("REDUCE_DARK", "UFTI", SourceKind::Primitive),
            Err(ResolveError::NotFound)
        ));
    }

    #[test]
    fn test_compiles_from_disk() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("recipes").join("REDUCE_DARK"), REDUCE_DARK);
        write(&dir.path().join("primitives").join("_SUBTRACT_BIAS_"), SUBTRACT_BIAS);
        let resolver = DirectoryResolver::new()
            .with_recipe_dir(dir.path().join("recipes"))
            .with_primitive_dir(dir.path().join("primitives"));

        let unit = Compiler::builder(resolver)
            .build()
            .compile(&Recipe::new("REDUCE_DARK", "UFTI"))
            .expect("Failed to compile from disk");
        assert_eq!(unit.listing_lines(), dark_unit().listing_lines());
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_from_file_drives_compiler() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("recipes").join("TEST"), "_ONE_");
        write(&dir.path().join("primitives").join("_ONE_"), "_TWO_");
        write(&dir.path().join("primitives").join("_TWO_"), "print \"deep\"");
        let config_path = dir.path().join("pipeline.json");
        let config = serde_json::json!({
            "recipe_dirs": [dir.path().join("recipes")],
            "primitive_dirs": [dir.path().join("primitives")],
            "max_depth": 1,
            "batch": true,
        });
        write(&config_path, &config.to_string());

        let config = PipelineConfig::from_file(&config_path).expect("Failed to load config");
        assert!(config.flags().batch);
        assert!(!config.flags().debug);

        let compiler = config.compiler();
        assert_eq!(compiler.max_depth(), 1);
        let err = compiler
            .compile(&Recipe::new("TEST", "UFTI"))
            .expect_err("depth 2 exceeds the configured limit");
        assert!(matches!(err, CompileError::RecursionLimitExceeded { depth: 2, limit: 1, .. }));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let err = PipelineConfig::from_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("nope.json")));
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_rejects_unknown_engine() {
        let mut registry = EngineRegistry::new();
        assert!(matches!(
            registry.invoke("ccdpack", "makebias", ""),
            Err(DispatchError::UnknownEngine(name)) if name == "ccdpack"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_engine_maps_exit_code() {
        let mut registry = EngineRegistry::new()
            .with_engine("ok", CommandEngine::new("ok", "sh").with_args(["-c", "exit 0"]))
            .with_engine("bad", CommandEngine::new("bad", "sh").with_args(["-c", "exit 3"]));
        assert_eq!(registry.invoke("ok", "stats", "in=f001").unwrap(), Status::OK);
        assert_eq!(registry.invoke("bad", "stats", "in=f001").unwrap(), Status(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_engine_missing_program() {
        let mut engine = CommandEngine::new("ghost", "/nonexistent/kansoku-engine");
        assert!(matches!(
            engine.obey("stats", ""),
            Err(DispatchError::Unavailable { engine, .. }) if engine == "ghost"
        ));
    }
}
