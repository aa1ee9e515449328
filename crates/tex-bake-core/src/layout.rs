//! Contract with the atlas layout collaborator. The rectangle-packing
//! algorithm itself lives outside this crate; the pipeline only consumes
//! the rasterized pages it produces.

use image::RgbaImage;

use crate::config::{PackDefinition, PackerOptions};
use crate::error::Result;

/// One rasterized atlas page. Owned by the pipeline for the duration of a
/// single writer invocation and never retained afterwards.
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// Zero-based page index within the pack.
    pub index: usize,
    /// Page pixels in RGBA8888 order.
    pub rgba: RgbaImage,
}

impl PageRaster {
    pub fn new(index: usize, rgba: RgbaImage) -> Self {
        Self { index, rgba }
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    /// Uncompressed RGBA8888 size, the baseline for compression metadata.
    pub fn baseline_bytes(&self) -> u64 {
        self.width() as u64 * self.height() as u64 * 4
    }
}

/// Capability the pipeline calls to lay out one pack. Implementations may
/// produce zero pages (an empty pack succeeds trivially); failures map to
/// `PipelineError::Layout`.
pub trait LayoutProvider: Send + Sync {
    fn layout(&self, pack: &PackDefinition, options: &PackerOptions) -> Result<Vec<PageRaster>>;
}
