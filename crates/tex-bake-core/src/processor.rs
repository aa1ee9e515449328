//! Pack processors: the ordered stages the pipeline runs over a node
//! before any page is written. The file-type processors inspect the
//! project's selected file type, validate platform support, derive writer
//! settings onto the node and install the matching page file writer.
//! Processors never touch disk.

use tracing::debug;

use crate::codec::{Container, EncodeOptions, EncodingMode};
use crate::config::{FileType, PixelFormat, ProjectSettings};
use crate::error::{PipelineError, Result};
use crate::node::ProcessingNode;
use crate::pipeline::PipelineContext;
use crate::platform::basis_supported;
use crate::writer::{BasisPageWriter, JpegPageWriter, PngPageWriter};

/// Where to ask for additional platform support.
pub const ISSUE_TRACKER_URL: &str = "https://github.com/texbake/tex-bake/issues";

/// One pipeline stage. A processor that does not apply to the node's
/// project is a no-op; the pipeline continues with the next one.
pub trait PackProcessor: Send + Sync {
    fn apply(
        &self,
        node: &mut ProcessingNode,
        settings: &ProjectSettings,
        ctx: &PipelineContext,
    ) -> Result<()>;
}

/// Installs the PNG writer when the project targets PNG.
#[derive(Debug, Default)]
pub struct PngFileTypeProcessor;

impl PackProcessor for PngFileTypeProcessor {
    fn apply(
        &self,
        node: &mut ProcessingNode,
        settings: &ProjectSettings,
        _ctx: &PipelineContext,
    ) -> Result<()> {
        let FileType::Png(_) = settings.file_type else {
            return Ok(());
        };
        node.set_pixel_format(PixelFormat::Rgba8888);
        node.log_line("file type: png");
        node.set_writer(Box::new(PngPageWriter))
    }
}

/// Installs the JPEG writer when the project targets JPEG. JPEG carries no
/// alpha, so the derived pixel format drops to RGB888.
#[derive(Debug, Default)]
pub struct JpegFileTypeProcessor;

impl PackProcessor for JpegFileTypeProcessor {
    fn apply(
        &self,
        node: &mut ProcessingNode,
        settings: &ProjectSettings,
        _ctx: &PipelineContext,
    ) -> Result<()> {
        let FileType::Jpeg(jpeg) = &settings.file_type else {
            return Ok(());
        };
        node.set_pixel_format(PixelFormat::Rgb888);
        node.log_line(format!("file type: jpeg (quality {})", jpeg.quality));
        node.set_writer(Box::new(JpegPageWriter::new(jpeg.quality)))
    }
}

/// Installs the Basis Universal writer when the project targets Basis.
/// Queries the capability gate before anything else; an unsupported
/// platform fails here and the bridge is never invoked.
#[derive(Debug, Default)]
pub struct BasisFileTypeProcessor;

impl PackProcessor for BasisFileTypeProcessor {
    fn apply(
        &self,
        node: &mut ProcessingNode,
        settings: &ProjectSettings,
        ctx: &PipelineContext,
    ) -> Result<()> {
        let FileType::Basis(basis) = &settings.file_type else {
            return Ok(());
        };

        if !basis_supported(ctx.platform) {
            return Err(PipelineError::PlatformUnsupported(format!(
                "KTX2/Basis Universal codec is not supported on the current platform: {}\n\
                 If you need this platform supported, please open an issue at {}",
                ctx.platform, ISSUE_TRACKER_URL
            )));
        }

        // The codec consumes RGBA8888 regardless of project preferences.
        node.set_pixel_format(PixelFormat::Rgba8888);
        let mipmaps = node
            .pack()
            .effective_options(settings)
            .min_filter
            .is_mip_map();
        node.set_mipmaps(mipmaps);

        let options = EncodeOptions {
            container: if basis.ktx2 {
                Container::Ktx2
            } else {
                Container::Basis
            },
            mode: if basis.uastc {
                EncodingMode::Uastc
            } else {
                EncodingMode::Etc1s
            },
            compression_level: basis.compression_level,
            quality_level: basis.quality_level,
            mipmaps,
        };
        options.validate()?;

        debug!(
            pack = node.pack().canonical_name(),
            container = options.container.extension(),
            mipmaps,
            "basis writer configured"
        );
        node.log_line(format!(
            "file type: basis ({}, {}, compression {}, quality {}, mipmaps {})",
            options.container.extension(),
            match options.mode {
                EncodingMode::Etc1s => "etc1s",
                EncodingMode::Uastc => "uastc",
            },
            options.compression_level,
            options.quality_level,
            mipmaps
        ));
        node.set_writer(Box::new(BasisPageWriter::new(options)))
    }
}

/// The standard processor order the coordinator runs.
pub fn standard_processors() -> Vec<Box<dyn PackProcessor>> {
    vec![
        Box::new(PngFileTypeProcessor),
        Box::new(JpegFileTypeProcessor),
        Box::new(BasisFileTypeProcessor),
    ]
}
