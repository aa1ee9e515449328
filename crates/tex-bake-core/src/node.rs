//! Per-pack processing node: the mutable working context threaded through
//! one pipeline run. Created at run start, consumed into a
//! [`ProcessingResult`] when the caller collects it; never shared across
//! concurrent runs.

use serde_json::Value;

use crate::config::{PackDefinition, PixelFormat};
use crate::error::{PipelineError, Result};
use crate::writer::PageFileWriter;

/// Achieved size relative to the uncompressed RGBA baseline,
/// `(compressed - baseline) / baseline`. Stored as an f64.
pub const META_COMPRESSION_RATE: &str = "compression-rate";
/// Total bytes written for the pack.
pub const META_TOTAL_BYTES: &str = "total-bytes";
/// Number of pages written.
pub const META_PAGE_COUNT: &str = "page-count";

/// Renders a compression rate with an explicit sign and two decimals,
/// e.g. `-60.00%`.
pub fn format_compression_rate(rate: f64) -> String {
    format!("{:+.2}%", rate * 100.0)
}

/// Lifecycle of one pack run. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

pub struct ProcessingNode {
    pack: PackDefinition,
    status: PackStatus,
    error: Option<PipelineError>,
    /// Insertion-ordered metadata.
    metadata: Vec<(String, Value)>,
    log: String,
    writer: Option<Box<dyn PageFileWriter>>,
    pixel_format: PixelFormat,
    mipmaps: bool,
}

impl ProcessingNode {
    pub fn new(pack: PackDefinition) -> Self {
        Self {
            pack,
            status: PackStatus::Pending,
            error: None,
            metadata: Vec::new(),
            log: String::new(),
            writer: None,
            pixel_format: PixelFormat::Rgba8888,
            mipmaps: false,
        }
    }

    pub fn pack(&self) -> &PackDefinition {
        &self.pack
    }

    pub fn status(&self) -> PackStatus {
        self.status
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn metadata(&self) -> &[(String, Value)] {
        &self.metadata
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn mipmaps(&self) -> bool {
        self.mipmaps
    }

    pub fn writer(&self) -> Option<&dyn PageFileWriter> {
        self.writer.as_deref()
    }

    /// `Pending -> Running`. Ignored (with a debug assertion) once
    /// terminal.
    pub fn set_running(&mut self) {
        debug_assert!(!self.status.is_terminal(), "node mutated after terminal state");
        if self.status == PackStatus::Pending {
            self.status = PackStatus::Running;
        }
    }

    /// `Running -> Succeeded`.
    pub fn finish_ok(&mut self) {
        debug_assert_eq!(self.status, PackStatus::Running);
        if !self.status.is_terminal() {
            self.status = PackStatus::Succeeded;
        }
    }

    /// `Running -> Failed`, recording the triggering error.
    pub fn finish_err(&mut self, error: PipelineError) {
        debug_assert!(!self.status.is_terminal(), "node mutated after terminal state");
        if !self.status.is_terminal() {
            self.status = PackStatus::Failed;
            self.error = Some(error);
        }
    }

    /// Appends one line to the captured log. No-op after a terminal state
    /// is reached.
    pub fn log_line(&mut self, line: impl AsRef<str>) {
        if self.status.is_terminal() {
            debug_assert!(false, "node mutated after terminal state");
            return;
        }
        self.log.push_str(line.as_ref());
        self.log.push('\n');
    }

    /// Inserts or updates a metadata entry, preserving first-insertion
    /// order.
    pub fn put_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if self.status.is_terminal() {
            debug_assert!(false, "node mutated after terminal state");
            return;
        }
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.metadata.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.metadata.push((key, value));
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Installs the page file writer. Write-once: a second installation is
    /// a programming fault.
    pub fn set_writer(&mut self, writer: Box<dyn PageFileWriter>) -> Result<()> {
        if self.writer.is_some() {
            return Err(PipelineError::InvalidInput(format!(
                "page file writer already installed for pack `{}`",
                self.pack.canonical_name()
            )));
        }
        self.writer = Some(writer);
        Ok(())
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        self.pixel_format = format;
    }

    pub fn set_mipmaps(&mut self, mipmaps: bool) {
        self.mipmaps = mipmaps;
    }

    /// Consumes the node into the caller-facing terminal result.
    pub fn into_result(self) -> ProcessingResult {
        ProcessingResult {
            pack: self.pack.canonical_name().to_string(),
            status: self.status,
            metadata: self.metadata,
            log: self.log,
            error: self.error,
        }
    }
}

impl std::fmt::Debug for ProcessingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingNode")
            .field("pack", &self.pack.canonical_name())
            .field("status", &self.status)
            .field("writer", &self.writer.as_ref().map(|w| w.extension()))
            .finish()
    }
}

/// Terminal outcome of one pack run: status, metadata and captured log,
/// correlated to the submitted pack by canonical name and position.
#[derive(Debug)]
pub struct ProcessingResult {
    pub pack: String,
    pub status: PackStatus,
    pub metadata: Vec<(String, Value)>,
    pub log: String,
    pub error: Option<PipelineError>,
}

impl ProcessingResult {
    pub fn succeeded(&self) -> bool {
        self.status == PackStatus::Succeeded
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}
