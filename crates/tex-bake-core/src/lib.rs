//! Core library for baking texture atlas packs into page files.
//!
//! - Pipeline: processors derive writer settings per pack, a layout
//!   collaborator produces rasterized pages, page file writers persist
//!   them atomically (PNG, JPEG, or Basis Universal through a native
//!   bridge).
//! - Coordinator: `RunCoordinator::run_all` drives every pack of a
//!   project, reports progress through a `ProgressSink` and returns one
//!   terminal `ProcessingResult` per pack in submission order.
//! - Capability gate: the Basis codec is only reachable on platforms the
//!   native wrapper library ships for; everything else fails fast with a
//!   remediation message.
//!
//! Quick example:
//! ```ignore
//! use tex_bake_core::prelude::*;
//! # fn main() {
//! let settings = ProjectSettings::default();
//! let coordinator = RunCoordinator::new(&settings);
//! let results = coordinator.run_all(
//!     vec![PackDefinition::new("sprites", "assets/sprites")],
//!     &settings,
//!     &my_layout,
//!     "out".as_ref(),
//!     &NullSink,
//!     &CancelToken::new(),
//! );
//! for result in &results {
//!     println!("{}: {:?}", result.pack, result.status);
//! }
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod layout;
pub mod node;
pub mod pipeline;
pub mod platform;
pub mod processor;
pub mod writer;

pub use codec::*;
pub use config::*;
pub use coordinator::*;
pub use error::*;
pub use events::*;
pub use layout::*;
pub use node::*;
pub use pipeline::*;
pub use platform::*;
pub use processor::*;
pub use writer::*;

/// Convenience prelude for common types and functions.
/// Importing `tex_bake_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::codec::{
        shared_encoder, BasisEncoder, EncodeOptions, EncodedBuffer, SharedEncoder, TextureEncoder,
    };
    pub use crate::config::{
        BasisSettings, FileType, JpegSettings, PackDefinition, PackerOptions, PixelFormat,
        PngSettings, ProjectSettings, ScaleFilter,
    };
    pub use crate::coordinator::RunCoordinator;
    pub use crate::error::{PipelineError, Result};
    pub use crate::events::{FnSink, NullSink, PackEvent, ProgressSink};
    pub use crate::layout::{LayoutProvider, PageRaster};
    pub use crate::node::{format_compression_rate, PackStatus, ProcessingResult};
    pub use crate::pipeline::{CancelToken, PipelineContext};
    pub use crate::platform::{basis_supported, CapabilityKey};
}
