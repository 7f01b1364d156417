//! Common test utilities: in-memory recipes, a recording engine and log capture.
use ahash::AHashMap;
use kansoku::prelude::*;
use std::io;
use std::sync::{Arc, Mutex};

/// A recipe with one bare engine call inside a primitive.
#[allow(dead_code)]
pub const REDUCE_DARK: &str = "\
# Reduce a dark frame
_SUBTRACT_BIAS_ BIAS=bias_01
print \"dark reduced\"";

#[allow(dead_code)]
pub const SUBTRACT_BIAS: &str = "\
bias = arg(BIAS)
obey kappa sub \"in=${frm.file} bias=${bias}\"";

/// Resolver holding `REDUCE_DARK` and its primitive.
#[allow(dead_code)]
pub fn dark_resolver() -> MemoryResolver {
    MemoryResolver::new()
        .with_recipe("REDUCE_DARK", REDUCE_DARK)
        .with_primitive("_SUBTRACT_BIAS_", SUBTRACT_BIAS)
}

/// Resolver with a single recipe named `TEST` and nothing else.
#[allow(dead_code)]
pub fn single_recipe(text: &str) -> MemoryResolver {
    MemoryResolver::new().with_recipe("TEST", text)
}

#[allow(dead_code)]
pub fn compile_test(resolver: MemoryResolver) -> CompiledUnit {
    Compiler::builder(resolver)
        .build()
        .compile(&Recipe::new("TEST", "UFTI"))
        .expect("Failed to compile test recipe")
}

/// One engine invocation as seen by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub engine: String,
    pub action: String,
    pub args: String,
}

/// Shared view of every call made to the recording engines it was handed to.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

#[allow(dead_code)]
impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().expect("call log poisoned").clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().expect("call log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An engine that records its calls and answers with configurable statuses.
pub struct RecordingEngine {
    name: String,
    log: CallLog,
    statuses: AHashMap<String, Status>,
    terminate_on: Option<(String, Termination)>,
}

#[allow(dead_code)]
impl RecordingEngine {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            statuses: AHashMap::new(),
            terminate_on: None,
        }
    }

    /// Answer `action` with `code` instead of OK.
    pub fn with_status(mut self, action: &str, code: i32) -> Self {
        self.statuses.insert(action.to_string(), Status(code));
        self
    }

    /// Request termination while `action` runs; the call itself still succeeds.
    pub fn terminating_on(mut self, action: &str, termination: &Termination) -> Self {
        self.terminate_on = Some((action.to_string(), termination.clone()));
        self
    }
}

impl Engine for RecordingEngine {
    fn obey(&mut self, action: &str, args: &str) -> std::result::Result<Status, DispatchError> {
        self.log
            .0
            .lock()
            .expect("call log poisoned")
            .push(RecordedCall {
                engine: self.name.clone(),
                action: action.to_string(),
                args: args.to_string(),
            });
        if let Some((trigger, termination)) = &self.terminate_on {
            if trigger == action {
                termination.request();
            }
        }
        Ok(self.statuses.get(action).copied().unwrap_or(Status::OK))
    }
}

/// A run context whose frame is `file` with the given header and a `kappa` recording engine.
#[allow(dead_code)]
pub fn recording_context(file: &str, header: Header, engine: RecordingEngine) -> RunContext {
    RunContext::new(
        DataObject::new(file).with_header(header),
        DataObject::new("g20240101_00001"),
    )
    .with_engines(EngineRegistry::new().with_engine("kappa", engine))
}

/// Routes `tracing` output to the test harness. Safe to call from every test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An in-memory log sink for asserting on emitted messages.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer poisoned")).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber capturing everything at debug level and above.
#[allow(dead_code)]
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

/// The two-record dark index used by the selection tests: `A` at 10.0, `B` at 10.5.
#[allow(dead_code)]
pub fn time_only_index() -> CalibrationIndex {
    let rules = RuleSet::new()
        .with_rule("ORACTIME", "")
        .expect("Failed to build rules");
    let mut index = CalibrationIndex::with_rules("dark", rules);
    index
        .add("A", &Header::from_iter([("ORACTIME", 10.0)]))
        .expect("Failed to add A");
    index
        .add("B", &Header::from_iter([("ORACTIME", 10.5)]))
        .expect("Failed to add B");
    index
}
