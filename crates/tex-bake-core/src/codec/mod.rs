//! Native codec bridge: hands RGBA page buffers to the Basis Universal
//! encoder and returns compressed bitstreams with exactly-once release.
//!
//! The bridge is not reentrant: at most one encode call may be in flight
//! process-wide (the native wrapper keeps global state). That exclusion is
//! the run coordinator's job, expressed through [`SharedEncoder`] and
//! [`lock_encoder`]; this module only validates inputs and carries buffers
//! across the boundary.

pub mod ffi;

use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use ffi::{BasisLibrary, RawEncodeParams};

/// Output container produced by the bridge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Bare `.basis` bitstream.
    Basis,
    /// KTX2 texture container.
    Ktx2,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Basis => "basis",
            Self::Ktx2 => "ktx2",
        }
    }
}

/// Encoding mode: block-compressed ETC1S (smaller) or UASTC (higher
/// fidelity).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    Etc1s,
    Uastc,
}

/// Valid ETC1S compression effort levels.
pub const COMPRESSION_LEVEL_RANGE: std::ops::RangeInclusive<u32> = 0..=6;
/// Valid perceptual quality levels.
pub const QUALITY_LEVEL_RANGE: std::ops::RangeInclusive<u32> = 1..=255;

// Fixed defaults the pipeline does not expose.
const MIP_SCALE: f32 = 0.5;
const PERCEPTUAL: bool = false;
const FORCE_ALPHA: bool = false;

/// Closed configuration for one encode call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub container: Container,
    pub mode: EncodingMode,
    /// Compression effort, 0..=6.
    pub compression_level: u32,
    /// Perceptual quality, 1..=255.
    pub quality_level: u32,
    /// Generate the mipmap chain inside the container.
    pub mipmaps: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            container: Container::Basis,
            mode: EncodingMode::Etc1s,
            compression_level: 1,
            quality_level: 128,
            mipmaps: false,
        }
    }
}

impl EncodeOptions {
    /// Checks option bounds. Violations are configuration defects and are
    /// reported as `InvalidInput` before any native call.
    pub fn validate(&self) -> Result<()> {
        if !COMPRESSION_LEVEL_RANGE.contains(&self.compression_level) {
            return Err(PipelineError::InvalidInput(format!(
                "compression_level {} outside {:?}",
                self.compression_level, COMPRESSION_LEVEL_RANGE
            )));
        }
        if !QUALITY_LEVEL_RANGE.contains(&self.quality_level) {
            return Err(PipelineError::InvalidInput(format!(
                "quality_level {} outside {:?}",
                self.quality_level, QUALITY_LEVEL_RANGE
            )));
        }
        Ok(())
    }
}

/// Checks the frame geometry the bridge requires: positive dimensions and
/// an RGBA8888 buffer of exactly `width * height * 4` bytes.
pub fn validate_frame(pixels: &[u8], width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "invalid frame dimensions {width}x{height}"
        )));
    }
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(PipelineError::InvalidInput(format!(
            "pixel buffer is {} bytes, expected {expected} for {width}x{height} RGBA8888",
            pixels.len()
        )));
    }
    Ok(())
}

enum BufferData {
    /// Bitstream owned by Rust, optionally with a release observer
    /// attached by an encoder implementation.
    Owned {
        bytes: Vec<u8>,
        on_release: Option<Box<dyn FnOnce() + Send>>,
    },
    /// Bitstream owned by the native wrapper; freed through the library
    /// on drop.
    Native {
        ptr: NonNull<u8>,
        len: usize,
        lib: Arc<BasisLibrary>,
    },
}

// SAFETY: the native pointer is a plain heap allocation handed over by the
// wrapper; nothing about it is tied to the originating thread.
unsafe impl Send for BufferData {}

/// Compressed bitstream returned by a [`TextureEncoder`].
///
/// Ownership is explicit: the encoder allocates, the receiving page file
/// writer persists, and the buffer releases its backing storage exactly
/// once on drop, on every exit path.
pub struct EncodedBuffer {
    data: BufferData,
}

impl EncodedBuffer {
    /// Buffer backed by a plain vector.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            data: BufferData::Owned {
                bytes,
                on_release: None,
            },
        }
    }

    /// Buffer backed by a vector with a custom release action. Encoder
    /// implementations outside this crate use this to tie cleanup (or, in
    /// tests, release accounting) to the buffer's lifetime.
    pub fn with_release_hook(bytes: Vec<u8>, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            data: BufferData::Owned {
                bytes,
                on_release: Some(Box::new(hook)),
            },
        }
    }

    fn from_native(ptr: NonNull<u8>, len: usize, lib: Arc<BasisLibrary>) -> Self {
        Self {
            data: BufferData::Native { ptr, len, lib },
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            BufferData::Owned { bytes, .. } => bytes,
            // SAFETY: ptr/len describe the wrapper's live allocation until
            // drop.
            BufferData::Native { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for EncodedBuffer {
    fn drop(&mut self) {
        match &mut self.data {
            BufferData::Owned { on_release, .. } => {
                if let Some(hook) = on_release.take() {
                    hook();
                }
            }
            BufferData::Native { ptr, lib, .. } => {
                // SAFETY: the pointer came from this library's encode call
                // and drop runs once.
                unsafe { lib.free(*ptr) };
            }
        }
    }
}

impl std::fmt::Debug for EncodedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// The seam between the pipeline and a concrete encoder. The production
/// implementation is [`BasisEncoder`]; tests install spies and fakes.
pub trait TextureEncoder: Send {
    fn encode(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        options: &EncodeOptions,
    ) -> Result<EncodedBuffer>;
}

/// Shared, mutually-exclusive handle to the process-wide encoder. The lock
/// spans exactly one encode call; layout and raster work stay parallel.
pub type SharedEncoder = Arc<Mutex<Box<dyn TextureEncoder>>>;

pub fn shared_encoder(encoder: impl TextureEncoder + 'static) -> SharedEncoder {
    Arc::new(Mutex::new(Box::new(encoder)))
}

/// Acquires the encoder lock, optionally bounded by the project's codec
/// wait timeout so no writer blocks indefinitely.
pub fn lock_encoder<'a>(
    encoder: &'a SharedEncoder,
    timeout: Option<Duration>,
) -> Result<MutexGuard<'a, Box<dyn TextureEncoder>>> {
    match timeout {
        None => encoder
            .lock()
            .map_err(|_| PipelineError::Codec("encoder lock poisoned".into())),
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                match encoder.try_lock() {
                    Ok(guard) => return Ok(guard),
                    Err(std::sync::TryLockError::Poisoned(_)) => {
                        return Err(PipelineError::Codec("encoder lock poisoned".into()));
                    }
                    Err(std::sync::TryLockError::WouldBlock) => {
                        if Instant::now() >= deadline {
                            return Err(PipelineError::Codec(format!(
                                "timed out after {}ms waiting for the codec",
                                limit.as_millis()
                            )));
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        }
    }
}

static LIBRARY: OnceLock<std::result::Result<Arc<BasisLibrary>, String>> = OnceLock::new();

static PROCESS_ENCODER: OnceLock<SharedEncoder> = OnceLock::new();

/// The process-wide production encoder handle. The native wrapper keeps
/// global state, so exclusion must span the whole process, not one
/// coordinator: every caller that encodes through [`BasisEncoder`] must
/// clone this one handle instead of minting its own mutex.
pub fn process_encoder() -> SharedEncoder {
    Arc::clone(PROCESS_ENCODER.get_or_init(|| shared_encoder(BasisEncoder::default())))
}

/// Production encoder driving the native Basis Universal wrapper.
///
/// The wrapper library loads lazily on first use; the load result is
/// process-global and idempotent. A load failure is reported as a
/// platform-support error, never a panic.
#[derive(Debug, Default)]
pub struct BasisEncoder;

impl BasisEncoder {
    fn library() -> Result<Arc<BasisLibrary>> {
        let loaded = LIBRARY.get_or_init(|| BasisLibrary::load().map(Arc::new));
        match loaded {
            Ok(lib) => Ok(Arc::clone(lib)),
            Err(e) => Err(PipelineError::PlatformUnsupported(format!(
                "Basis Universal wrapper library unavailable: {e}"
            ))),
        }
    }
}

impl TextureEncoder for BasisEncoder {
    fn encode(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        options: &EncodeOptions,
    ) -> Result<EncodedBuffer> {
        validate_frame(pixels, width, height)?;
        options.validate()?;

        let lib = Self::library()?;
        let params = RawEncodeParams {
            uastc: matches!(options.mode, EncodingMode::Uastc),
            ktx2: matches!(options.container, Container::Ktx2),
            compression_level: options.compression_level as i32,
            quality_level: options.quality_level as i32,
            mipmaps: options.mipmaps,
            mip_scale: MIP_SCALE,
            perceptual: PERCEPTUAL,
            force_alpha: FORCE_ALPHA,
        };
        let (ptr, len) = lib
            .encode(pixels, width, height, params)
            .map_err(PipelineError::Codec)?;
        debug!(width, height, encoded = len, "native encode complete");
        Ok(EncodedBuffer::from_native(ptr, len, lib))
    }
}
