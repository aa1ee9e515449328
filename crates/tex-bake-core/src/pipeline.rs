//! The per-pack pipeline: processors, then layout, then one writer
//! invocation per page. All failures stay local to the pack; the run
//! coordinator decides what happens to siblings.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::SharedEncoder;
use crate::config::{PackDefinition, ProjectSettings};
use crate::error::{PipelineError, Result};
use crate::layout::LayoutProvider;
use crate::node::{
    format_compression_rate, ProcessingNode, ProcessingResult, META_COMPRESSION_RATE,
    META_PAGE_COUNT, META_TOTAL_BYTES,
};
use crate::platform::CapabilityKey;
use crate::processor::PackProcessor;
use crate::writer::WriteContext;

/// Cooperative cancellation flag shared between the caller and the run.
/// Checked between packs and between pages; an in-flight encode is never
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Run-wide immutable context handed to processors and writers: the
/// platform key the capability gate is queried with, the shared codec
/// handle, and the codec wait policy.
#[derive(Clone)]
pub struct PipelineContext {
    pub platform: CapabilityKey,
    pub encoder: SharedEncoder,
    pub codec_wait_timeout: Option<Duration>,
}

impl PipelineContext {
    /// Context for the current platform.
    pub fn new(encoder: SharedEncoder, settings: &ProjectSettings) -> Self {
        Self::with_platform(CapabilityKey::detect(), encoder, settings)
    }

    /// Context with an explicit platform key, so callers can simulate
    /// foreign platforms.
    pub fn with_platform(
        platform: CapabilityKey,
        encoder: SharedEncoder,
        settings: &ProjectSettings,
    ) -> Self {
        Self {
            platform,
            encoder,
            codec_wait_timeout: settings.codec_wait_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Destination file for one page: `<name>.<ext>` for single-page packs,
/// `<name>-<index>.<ext>` otherwise.
pub fn page_file_name(pack_name: &str, index: usize, page_count: usize, ext: &str) -> String {
    if page_count == 1 {
        format!("{pack_name}.{ext}")
    } else {
        format!("{pack_name}-{index}.{ext}")
    }
}

/// Runs one pack end to end and returns its terminal result. Never
/// returns `Err`: every failure is folded into the result.
pub fn process_pack(
    pack: PackDefinition,
    settings: &ProjectSettings,
    processors: &[Box<dyn PackProcessor>],
    layout: &dyn LayoutProvider,
    out_dir: &Path,
    ctx: &PipelineContext,
    cancel: &CancelToken,
) -> ProcessingResult {
    let mut node = ProcessingNode::new(pack);
    node.set_running();
    info!(pack = node.pack().canonical_name(), "pack started");

    match run_node(&mut node, settings, processors, layout, out_dir, ctx, cancel) {
        Ok(()) => node.finish_ok(),
        Err(e) => {
            warn!(pack = node.pack().canonical_name(), error = %e, "pack failed");
            node.finish_err(e);
        }
    }
    node.into_result()
}

fn run_node(
    node: &mut ProcessingNode,
    settings: &ProjectSettings,
    processors: &[Box<dyn PackProcessor>],
    layout: &dyn LayoutProvider,
    out_dir: &Path,
    ctx: &PipelineContext,
    cancel: &CancelToken,
) -> Result<()> {
    for processor in processors {
        processor.apply(node, settings, ctx)?;
    }
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let options = node.pack().effective_options(settings).clone();
    let pages = layout.layout(node.pack(), &options)?;
    node.log_line(format!("layout produced {} page(s)", pages.len()));

    if pages.is_empty() {
        node.put_metadata(META_PAGE_COUNT, 0);
        node.put_metadata(META_TOTAL_BYTES, 0);
        return Ok(());
    }

    let writer = node.writer().ok_or_else(|| {
        PipelineError::InvalidInput(format!(
            "no page file writer installed for pack `{}`",
            node.pack().canonical_name()
        ))
    })?;
    let ext = writer.extension();
    let write_ctx = WriteContext {
        encoder: &ctx.encoder,
        codec_wait_timeout: ctx.codec_wait_timeout,
    };

    let mut baseline: u64 = 0;
    let mut written: u64 = 0;
    let mut destinations: Vec<PathBuf> = Vec::with_capacity(pages.len());
    for page in &pages {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let dest = out_dir.join(page_file_name(
            node.pack().canonical_name(),
            page.index,
            pages.len(),
            ext,
        ));
        let bytes = writer.write(page, &write_ctx, &dest)?;
        debug!(dest = %dest.display(), bytes, "page written");
        baseline += page.baseline_bytes();
        written += bytes;
        destinations.push(dest);
    }

    for dest in &destinations {
        node.log_line(format!("wrote {}", dest.display()));
    }
    node.put_metadata(META_PAGE_COUNT, pages.len() as u64);
    node.put_metadata(META_TOTAL_BYTES, written);
    if baseline > 0 {
        let rate = (written as f64 - baseline as f64) / baseline as f64;
        node.put_metadata(META_COMPRESSION_RATE, rate);
        node.log_line(format!(
            "compression rate {}",
            format_compression_rate(rate)
        ));
    }
    Ok(())
}
