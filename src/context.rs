//! The bindings a compiled unit runs against.

use crate::calibration::Calibration;
use crate::dispatch::EngineRegistry;
use crate::error::HeaderError;
use crate::header::{Header, HeaderProvider, TranslationTable};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A frame or group: the current file plus header snapshots.
///
/// Headers are not tied to the file. After the file changes the object is
/// stale until [`DataObject::refresh`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataObject {
    file: Option<String>,
    pub hdr: Header,
    pub uhdr: Header,
    synced_file: Option<String>,
}

impl DataObject {
    pub fn new(file: &str) -> Self {
        Self {
            file: Some(file.to_string()),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, hdr: Header) -> Self {
        self.hdr = hdr;
        self.synced_file = self.file.clone();
        self
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn set_file(&mut self, file: &str) {
        self.file = Some(file.to_string());
    }

    /// The header with user header entries overlaid.
    pub fn merged_header(&self) -> Header {
        self.hdr.overlaid(&self.uhdr)
    }

    /// Whether the file changed since the headers were last synchronised.
    pub fn is_stale(&self) -> bool {
        self.file != self.synced_file
    }

    /// Re-reads the header of the current file and merges its translations into the user header.
    pub fn refresh(
        &mut self,
        provider: &dyn HeaderProvider,
        translations: &TranslationTable,
    ) -> Result<(), HeaderError> {
        let file = self.file.clone().ok_or(HeaderError::NoFile)?;
        self.hdr = provider.read_header(&file)?;
        self.uhdr.merge(&translations.translate(&self.hdr));
        debug!(file = %file, entries = self.hdr.len(), "header synchronised");
        self.synced_file = Some(file);
        Ok(())
    }
}

/// Flags passed explicitly to every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub debug: bool,
    pub batch: bool,
}

/// A shared handle used to request termination of a run.
///
/// The request is observed at the next engine call or status check.
#[derive(Debug, Clone, Default)]
pub struct Termination(Arc<AtomicBool>);

impl Termination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receives files to be displayed.
pub trait DisplayHandle {
    fn display(&mut self, file: &str, header: &Header) -> Result<(), String>;
}

/// Everything a run can see. Nothing outside these bindings leaks into a run.
pub struct RunContext {
    pub frame: DataObject,
    pub group: DataObject,
    pub calibration: Calibration,
    pub engines: EngineRegistry,
    pub display: Option<Box<dyn DisplayHandle>>,
    pub headers: Option<Box<dyn HeaderProvider>>,
    pub translations: TranslationTable,
    pub flags: RunFlags,
    pub termination: Termination,
    pub diagnostics_dir: PathBuf,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("frame", &self.frame)
            .field("group", &self.group)
            .field("calibration", &self.calibration)
            .field("engines", &self.engines)
            .field("flags", &self.flags)
            .field("diagnostics_dir", &self.diagnostics_dir)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(frame: DataObject, group: DataObject) -> Self {
        Self {
            frame,
            group,
            calibration: Calibration::new(),
            engines: EngineRegistry::new(),
            display: None,
            headers: None,
            translations: TranslationTable::generic(),
            flags: RunFlags::default(),
            termination: Termination::new(),
            diagnostics_dir: std::env::temp_dir(),
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_display(mut self, display: impl DisplayHandle + 'static) -> Self {
        self.display = Some(Box::new(display));
        self
    }

    pub fn with_header_provider(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Box::new(provider));
        self
    }

    pub fn with_translations(mut self, translations: TranslationTable) -> Self {
        self.translations = translations;
        self
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = dir.into();
        self
    }
}
