use tex_bake_core::codec::{
    shared_encoder, Container, EncodeOptions, EncodedBuffer, EncodingMode, TextureEncoder,
};
use tex_bake_core::config::{
    BasisSettings, FileType, JpegSettings, PackDefinition, PackerOptions, PixelFormat,
    ProjectSettings, ScaleFilter,
};
use tex_bake_core::error::{PipelineError, Result};
use tex_bake_core::node::ProcessingNode;
use tex_bake_core::pipeline::PipelineContext;
use tex_bake_core::platform::{CapabilityKey, CpuArch, OperatingSystem};
use tex_bake_core::processor::{
    standard_processors, BasisFileTypeProcessor, JpegFileTypeProcessor, PackProcessor,
    PngFileTypeProcessor,
};

struct NopEncoder;

impl TextureEncoder for NopEncoder {
    fn encode(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
        _options: &EncodeOptions,
    ) -> Result<EncodedBuffer> {
        Ok(EncodedBuffer::from_vec(Vec::new()))
    }
}

fn context(settings: &ProjectSettings) -> PipelineContext {
    PipelineContext::with_platform(
        CapabilityKey::new(OperatingSystem::Linux, CpuArch::Amd64),
        shared_encoder(NopEncoder),
        settings,
    )
}

fn settings(file_type: FileType) -> ProjectSettings {
    ProjectSettings {
        file_type,
        ..Default::default()
    }
}

#[test]
fn png_processor_installs_the_png_writer() {
    let settings = settings(FileType::default());
    let ctx = context(&settings);
    let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
    node.set_running();

    PngFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    assert_eq!(node.writer().unwrap().extension(), "png");
    assert_eq!(node.pixel_format(), PixelFormat::Rgba8888);
}

#[test]
fn jpeg_processor_drops_to_rgb888() {
    let settings = settings(FileType::Jpeg(JpegSettings { quality: 70 }));
    let ctx = context(&settings);
    let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
    node.set_running();

    JpegFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    assert_eq!(node.writer().unwrap().extension(), "jpg");
    assert_eq!(node.pixel_format(), PixelFormat::Rgb888);
}

#[test]
fn processors_are_no_ops_for_other_file_types() {
    let settings = settings(FileType::default());
    let ctx = context(&settings);
    let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
    node.set_running();

    JpegFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    BasisFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    assert!(node.writer().is_none());
}

#[test]
fn second_writer_installation_is_a_fault() {
    let settings = settings(FileType::default());
    let ctx = context(&settings);
    let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
    node.set_running();

    PngFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    let err = PngFileTypeProcessor
        .apply(&mut node, &settings, &ctx)
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[test]
fn basis_processor_maps_settings_onto_encode_options() {
    let settings = settings(FileType::Basis(BasisSettings {
        ktx2: true,
        uastc: true,
        compression_level: 4,
        quality_level: 200,
    }));
    let ctx = context(&settings);
    let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
    node.set_running();

    BasisFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    assert_eq!(node.pixel_format(), PixelFormat::Rgba8888);
    assert_eq!(node.writer().unwrap().extension(), "ktx2");
    assert!(node.log().contains("uastc"));
    assert!(node.log().contains("compression 4"));
}

#[test]
fn basis_processor_derives_mipmaps_from_the_min_filter() {
    let settings = settings(FileType::Basis(BasisSettings::default()));
    let ctx = context(&settings);

    let mut pack = PackDefinition::new("a", "in/a");
    pack.options = Some(PackerOptions {
        min_filter: ScaleFilter::MipMapLinearLinear,
        ..Default::default()
    });
    let mut node = ProcessingNode::new(pack);
    node.set_running();
    BasisFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    assert!(node.mipmaps());

    let mut node = ProcessingNode::new(PackDefinition::new("b", "in/b"));
    node.set_running();
    BasisFileTypeProcessor.apply(&mut node, &settings, &ctx).unwrap();
    assert!(!node.mipmaps(), "nearest min filter requests no mipmaps");
}

#[test]
fn basis_processor_rejects_out_of_range_levels() {
    let settings = settings(FileType::Basis(BasisSettings {
        compression_level: 9,
        ..Default::default()
    }));
    let ctx = context(&settings);
    let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
    node.set_running();

    let err = BasisFileTypeProcessor
        .apply(&mut node, &settings, &ctx)
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[test]
fn standard_processors_install_exactly_one_writer() {
    for file_type in [
        FileType::default(),
        FileType::Jpeg(JpegSettings::default()),
        FileType::Basis(BasisSettings::default()),
    ] {
        let expected = match &file_type {
            FileType::Png(_) => "png",
            FileType::Jpeg(_) => "jpg",
            FileType::Basis(_) => "basis",
        };
        let settings = settings(file_type);
        let ctx = context(&settings);
        let mut node = ProcessingNode::new(PackDefinition::new("a", "in/a"));
        node.set_running();
        for processor in standard_processors() {
            processor.apply(&mut node, &settings, &ctx).unwrap();
        }
        assert_eq!(node.writer().unwrap().extension(), expected);
    }
}

#[test]
fn basis_options_match_the_writer_defaults() {
    // Default settings must land on the stock ETC1S defaults.
    let defaults = EncodeOptions::default();
    assert_eq!(defaults.container, Container::Basis);
    assert_eq!(defaults.mode, EncodingMode::Etc1s);
    assert_eq!(defaults.compression_level, 1);
    assert_eq!(defaults.quality_level, 128);
}
