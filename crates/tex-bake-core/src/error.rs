use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for the pack processing pipeline.
///
/// Every variant is pack-local: it terminates the owning pack's run and is
/// recorded on its processing node, never aborting sibling packs or the run
/// coordinator. Nothing here is auto-retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The selected file type needs a native codec that is not available on
    /// the detected platform. The message embeds the platform description
    /// and remediation text so callers can display it verbatim.
    #[error("{0}")]
    PlatformUnsupported(String),
    /// Programming or configuration defect (bad buffer size, out-of-range
    /// option, double writer installation). Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The native encoder rejected the input; carries the native diagnostic
    /// text verbatim.
    #[error("Codec error: {0}")]
    Codec(String),
    /// The atlas layout collaborator failed (e.g. unpackable input).
    #[error("Layout error: {0}")]
    Layout(String),
    /// Disk write or permission failure; includes the destination path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Raster encode failure from the `image` crate.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// The run was cancelled before this pack completed.
    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
