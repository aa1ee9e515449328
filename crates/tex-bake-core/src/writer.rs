//! Page file writers: serialize one rasterized page to disk, atomically.
//!
//! Raster variants (PNG/JPEG) encode through the `image` crate and never
//! touch the native bridge. The Basis variant encodes under the shared
//! codec lock and persists the returned [`EncodedBuffer`], which releases
//! its backing storage on every exit path.

use std::fs;
use std::path::Path;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::debug;

use crate::codec::{lock_encoder, EncodeOptions, SharedEncoder};
use crate::error::{PipelineError, Result};
use crate::layout::PageRaster;

/// Everything a writer needs besides the page itself. Raster writers
/// ignore the encoder handle.
pub struct WriteContext<'a> {
    pub encoder: &'a SharedEncoder,
    pub codec_wait_timeout: Option<Duration>,
}

/// Serializes one page. `write` returns the number of bytes persisted so
/// the pipeline can aggregate compression metadata.
pub trait PageFileWriter: Send + Sync {
    /// Output file extension, without the dot.
    fn extension(&self) -> &'static str;

    fn write(&self, page: &PageRaster, ctx: &WriteContext<'_>, dest: &Path) -> Result<u64>;
}

/// Writes `bytes` to `dest` all-or-nothing: temp file in the same
/// directory, then rename into place. A failure mid-stream never leaves a
/// file that looks complete; the temp file is removed on every error.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(dest, e))?;
        }
    }
    let file_name = dest
        .file_name()
        .ok_or_else(|| PipelineError::InvalidInput(format!("bad destination path {}", dest.display())))?;
    let tmp = dest.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(PipelineError::io(dest, e));
    }
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(PipelineError::io(dest, e));
    }
    Ok(bytes.len() as u64)
}

/// Lossless PNG page writer.
#[derive(Debug, Default)]
pub struct PngPageWriter;

impl PageFileWriter for PngPageWriter {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn write(&self, page: &PageRaster, _ctx: &WriteContext<'_>, dest: &Path) -> Result<u64> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes).write_image(
            page.rgba.as_raw(),
            page.width(),
            page.height(),
            ExtendedColorType::Rgba8,
        )?;
        write_atomic(dest, &bytes)
    }
}

/// Lossy JPEG page writer. Alpha is discarded.
#[derive(Debug)]
pub struct JpegPageWriter {
    quality: u8,
}

impl JpegPageWriter {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl PageFileWriter for JpegPageWriter {
    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn write(&self, page: &PageRaster, _ctx: &WriteContext<'_>, dest: &Path) -> Result<u64> {
        let rgb = image::DynamicImage::ImageRgba8(page.rgba.clone()).to_rgb8();
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
        encoder.encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
        write_atomic(dest, &bytes)
    }
}

/// Codec-backed page writer producing `.basis` or `.ktx2` files through
/// the native bridge.
#[derive(Debug)]
pub struct BasisPageWriter {
    options: EncodeOptions,
}

impl BasisPageWriter {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }
}

impl PageFileWriter for BasisPageWriter {
    fn extension(&self) -> &'static str {
        self.options.container.extension()
    }

    fn write(&self, page: &PageRaster, ctx: &WriteContext<'_>, dest: &Path) -> Result<u64> {
        // The bridge consumes interleaved R,G,B,A bytes; `RgbaImage`
        // stores exactly that order, so no per-pixel shuffle is required
        // here. The length invariant is re-checked on the bridge side.
        let pixels = page.rgba.as_raw();

        // Lock spans exactly the encode call; disk I/O below happens with
        // the codec released.
        let encoded = {
            let mut encoder = lock_encoder(ctx.encoder, ctx.codec_wait_timeout)?;
            encoder.encode(pixels, page.width(), page.height(), &self.options)?
        };
        debug!(
            page = page.index,
            raw = pixels.len(),
            encoded = encoded.len(),
            "page encoded"
        );

        // `encoded` drops (and releases its native storage) on success and
        // on the write failure path alike.
        write_atomic(dest, encoded.as_slice())
    }
}
