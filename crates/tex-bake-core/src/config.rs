use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Texture scale filters, as exposed by the project settings.
/// The min filter decides whether pages get mipmaps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScaleFilter {
    Nearest,
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapLinearNearest,
    MipMapNearestLinear,
    MipMapLinearLinear,
}

impl ScaleFilter {
    /// True for every filter that samples from mipmap chains.
    pub fn is_mip_map(&self) -> bool {
        !matches!(self, Self::Nearest | Self::Linear)
    }
}

impl FromStr for ScaleFilter {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "mipmap" => Ok(Self::MipMap),
            "mipmap_nearest_nearest" => Ok(Self::MipMapNearestNearest),
            "mipmap_linear_nearest" => Ok(Self::MipMapLinearNearest),
            "mipmap_nearest_linear" => Ok(Self::MipMapNearestLinear),
            "mipmap_linear_linear" => Ok(Self::MipMapLinearLinear),
            _ => Err(()),
        }
    }
}

/// Pixel format a page file writer targets. The Basis processor forces
/// `Rgba8888`; the JPEG processor drops to `Rgb888`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba8888,
    Rgb888,
}

/// Global packer options, overridable per pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerOptions {
    #[serde(default = "default_filter")]
    pub min_filter: ScaleFilter,
    #[serde(default = "default_filter")]
    pub mag_filter: ScaleFilter,
    /// Pixels between frames.
    #[serde(default = "default_padding")]
    pub padding: u32,
    /// Extrude edge pixels of each frame (for sampling safety).
    #[serde(default)]
    pub extrude: u32,
    /// Maximum page width in pixels.
    #[serde(default = "default_max_dim")]
    pub max_width: u32,
    /// Maximum page height in pixels.
    #[serde(default = "default_max_dim")]
    pub max_height: u32,
    /// Resize output pages to power-of-two.
    #[serde(default)]
    pub power_of_two: bool,
    /// Force square pages.
    #[serde(default)]
    pub square: bool,
}

impl Default for PackerOptions {
    fn default() -> Self {
        Self {
            min_filter: default_filter(),
            mag_filter: default_filter(),
            padding: default_padding(),
            extrude: 0,
            max_width: default_max_dim(),
            max_height: default_max_dim(),
            power_of_two: false,
            square: false,
        }
    }
}

fn default_filter() -> ScaleFilter {
    ScaleFilter::Nearest
}
fn default_padding() -> u32 {
    2
}
fn default_max_dim() -> u32 {
    2048
}

/// PNG file type settings. The PNG writer currently has no tunables beyond
/// the encoder defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PngSettings {}

/// JPEG file type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JpegSettings {
    /// Encoder quality, 1..=100.
    #[serde(default = "default_jpeg_quality")]
    pub quality: u8,
}

impl Default for JpegSettings {
    fn default() -> Self {
        Self {
            quality: default_jpeg_quality(),
        }
    }
}

fn default_jpeg_quality() -> u8 {
    90
}

/// Basis Universal file type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisSettings {
    /// Emit the KTX2 container instead of a bare `.basis` bitstream.
    #[serde(default)]
    pub ktx2: bool,
    /// Use the higher-fidelity UASTC mode instead of ETC1S.
    #[serde(default)]
    pub uastc: bool,
    /// ETC1S compression effort, 0..=6.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Perceptual quality, 1..=255.
    #[serde(default = "default_quality_level")]
    pub quality_level: u32,
}

impl Default for BasisSettings {
    fn default() -> Self {
        Self {
            ktx2: false,
            uastc: false,
            compression_level: default_compression_level(),
            quality_level: default_quality_level(),
        }
    }
}

fn default_compression_level() -> u32 {
    1
}
fn default_quality_level() -> u32 {
    128
}

/// Output file type selected for a project. Exactly one variant is active
/// per project at pipeline-start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileType {
    Png(PngSettings),
    Jpeg(JpegSettings),
    Basis(BasisSettings),
}

impl FileType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Png(_) => "png",
            Self::Jpeg(_) => "jpeg",
            Self::Basis(_) => "basis",
        }
    }
}

impl Default for FileType {
    fn default() -> Self {
        Self::Png(PngSettings::default())
    }
}

/// Immutable-per-run project settings: the selected file type plus global
/// packer options. Supplied by an external settings collaborator, not
/// parsed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub packer: PackerOptions,
    /// Upper bound in milliseconds a page writer waits for the shared
    /// codec before giving up with a codec error. `None` waits without
    /// bound.
    #[serde(default)]
    pub codec_wait_timeout_ms: Option<u64>,
    /// Process packs on worker threads when the `parallel` feature is on.
    #[serde(default)]
    pub parallel: bool,
}

/// One named atlas job: source folder plus per-pack option overrides.
/// Canonical names are unique within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackDefinition {
    pub name: String,
    pub source_dir: PathBuf,
    /// Output base name; falls back to `name`.
    #[serde(default)]
    pub output_name: Option<String>,
    /// Per-pack override of the global packer options.
    #[serde(default)]
    pub options: Option<PackerOptions>,
}

impl PackDefinition {
    pub fn new(name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
            output_name: None,
            options: None,
        }
    }

    /// The name output files are derived from.
    pub fn canonical_name(&self) -> &str {
        self.output_name.as_deref().unwrap_or(&self.name)
    }

    /// Pack options, falling back to the project-wide ones.
    pub fn effective_options<'a>(&'a self, settings: &'a ProjectSettings) -> &'a PackerOptions {
        self.options.as_ref().unwrap_or(&settings.packer)
    }
}
