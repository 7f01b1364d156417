use clap::{Parser, Subcommand};
use kansoku::calibration::TIME_FIELD;
use kansoku::header::TranslationRegistry;
use kansoku::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Header entry naming the recipe an observation asks for.
const RECIPE_HEADER: &str = "RECIPE";

/// Recipe compiler and runner for observation reduction pipelines
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the pipeline configuration JSON file
    #[arg(short, long, default_value = "pipeline.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile and run a recipe for each observation file
    Run {
        /// Instrument the observations were taken with
        #[arg(short, long)]
        instrument: String,
        /// Recipe to run instead of the one named in each header
        #[arg(short, long)]
        recipe: Option<String>,
        /// Observation files, in the order they should be reduced
        #[arg(required = true)]
        files: Vec<String>,
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        batch: bool,
    },
    /// Compile a recipe and write its listing or binary artifact
    Compile {
        recipe: String,
        #[arg(short, long)]
        instrument: String,
        /// Write the textual listing here instead of stdout
        #[arg(long)]
        listing: Option<PathBuf>,
        /// Write the binary artifact here
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        debug: bool,
    },
    /// Select the calibration of a kind closest to an observation
    Cal {
        kind: String,
        observation: String,
        #[arg(short, long)]
        instrument: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_file(&cli.config)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to load configuration: {}", e)));

    match cli.command {
        Command::Run {
            instrument,
            recipe,
            files,
            debug,
            batch,
        } => run_observations(&config, &instrument, recipe, &files, debug, batch),
        Command::Compile {
            recipe,
            instrument,
            listing,
            output,
            debug,
        } => compile_recipe(&config, &recipe, &instrument, listing, output, debug),
        Command::Cal {
            kind,
            observation,
            instrument,
        } => select_calibration(&config, &kind, &observation, &instrument),
    }
}

fn run_observations(
    config: &PipelineConfig,
    instrument: &str,
    recipe_override: Option<String>,
    files: &[String],
    debug: bool,
    batch: bool,
) {
    let total_start = Instant::now();
    let mut flags = config.flags();
    flags.debug |= debug;
    flags.batch |= batch;

    let calibration = config
        .calibration()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to open calibrations: {}", e)));
    let translations = TranslationRegistry::new().table(instrument);
    let mut engine = ExecutionEngine::new(config.compiler());
    let mut ctx = RunContext::new(DataObject::default(), DataObject::default())
        .with_calibration(calibration)
        .with_engines(config.engines())
        .with_header_provider(config.header_provider())
        .with_translations(translations.clone())
        .with_flags(flags)
        .with_diagnostics_dir(config.diagnostics_dir.clone());

    let mut failures = 0;
    for file in files {
        let mut frame = DataObject::new(file);
        let provider = config.header_provider();
        if let Err(e) = frame.refresh(&provider, &translations) {
            exit_with_error(&format!("Failed to read header of '{}': {}", file, e));
        }
        let recipe_name = match (&recipe_override, frame.hdr.get(RECIPE_HEADER)) {
            (Some(name), _) => name.clone(),
            (None, Some(name)) => name.to_string(),
            (None, None) => exit_with_error(&format!(
                "'{}' has no {} header and no --recipe was given",
                file, RECIPE_HEADER
            )),
        };
        if ctx.group.file().is_none() {
            ctx.group = frame.clone();
        }
        ctx.frame = frame;

        let recipe = Recipe::new(&recipe_name, instrument)
            .with_debug(flags.debug)
            .with_batch(flags.batch);
        println!("\nReducing {} with {}...", file, recipe_name);
        let compile_start = Instant::now();
        if let Err(e) = engine.prepare(&recipe) {
            exit_with_error(&format!("Compilation failed: {}", e));
        }
        let compile_duration = compile_start.elapsed();

        let run_start = Instant::now();
        match engine.run(&mut ctx) {
            Ok(outcome) => println!(
                "  -> Finished with status {} ({} statements, {} engine calls, compile {:?}, run {:?})",
                outcome.status,
                outcome.statements,
                outcome.engine_calls,
                compile_duration,
                run_start.elapsed()
            ),
            Err(failure) => {
                failures += 1;
                eprintln!("  -> {}", failure.report);
                for line in &failure.window {
                    eprintln!("     {}", line);
                }
                if let Some(path) = &failure.diagnostic {
                    eprintln!("  -> Listing written to {}", path.display());
                }
                if failure.class == FailureClass::Terminated {
                    break;
                }
            }
        }
    }

    println!("\n--- Summary ---");
    println!("Observations:   {}", files.len());
    println!("Failures:       {}", failures);
    println!("Total:          {:?}", total_start.elapsed());
    if failures > 0 {
        std::process::exit(1);
    }
}

fn compile_recipe(
    config: &PipelineConfig,
    recipe: &str,
    instrument: &str,
    listing: Option<PathBuf>,
    output: Option<PathBuf>,
    debug: bool,
) {
    let compile_start = Instant::now();
    let unit = config
        .compiler()
        .compile(&Recipe::new(recipe, instrument).with_debug(debug))
        .unwrap_or_else(|e| exit_with_error(&format!("Compilation failed: {}", e)));
    let compile_duration = compile_start.elapsed();

    match listing {
        Some(path) => std::fs::write(&path, unit.listing()).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to write listing '{}': {}", path.display(), e))
        }),
        None if output.is_none() => print!("{}", unit.listing()),
        None => {}
    }
    if let Some(path) = output {
        unit.save(&path).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to write artifact '{}': {}", path.display(), e))
        });
    }
    eprintln!(
        "Compiled {} for {}: {} statements in {:?}",
        recipe,
        instrument,
        unit.len(),
        compile_duration
    );
}

fn select_calibration(config: &PipelineConfig, kind: &str, observation: &str, instrument: &str) {
    let calibration = config
        .calibration()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to open calibrations: {}", e)));
    let mut frame = DataObject::new(observation);
    frame
        .refresh(
            &config.header_provider(),
            &TranslationRegistry::new().table(instrument),
        )
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read header: {}", e)));

    let header = frame.merged_header();
    match calibration.select(kind, &header) {
        Ok(key) => println!("{}", key),
        Err(e) => exit_with_error(&format!(
            "No {} calibration for '{}' (by {}): {}",
            kind, observation, TIME_FIELD, e
        )),
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
