//! Runtime bindings for the Basis Universal wrapper shared library.
//!
//! The wrapper exposes a small C surface around the Basis Universal
//! encoder. It is loaded dynamically via `libloading` so binaries built
//! without the native library degrade gracefully: load failures surface as
//! platform-unsupported errors rather than link errors.
//!
//! Wrapper contract:
//! - `basisu_encode` returns a heap buffer owned by the wrapper, or null on
//!   failure after writing a diagnostic into the caller-supplied buffer.
//! - Every non-null buffer must be handed back to `basisu_free` exactly
//!   once.

use std::ffi::c_char;
use std::ptr::NonNull;

use libloading::Library;
use tracing::{debug, info};

/// Capacity of the diagnostic buffer passed to the wrapper.
const DIAG_CAPACITY: usize = 512;

type EncodeFn = unsafe extern "C" fn(
    pixels: *const u8,
    width: u32,
    height: u32,
    uastc: bool,
    ktx2: bool,
    compression_level: i32,
    quality_level: i32,
    mipmaps: bool,
    mip_scale: f32,
    perceptual: bool,
    force_alpha: bool,
    out_len: *mut usize,
    diag: *mut c_char,
    diag_capacity: usize,
) -> *mut u8;

type FreeFn = unsafe extern "C" fn(ptr: *mut u8);

/// Per-encode parameters crossing the boundary. Validated by the bridge
/// before this module is reached.
#[derive(Debug, Clone, Copy)]
pub struct RawEncodeParams {
    pub uastc: bool,
    pub ktx2: bool,
    pub compression_level: i32,
    pub quality_level: i32,
    pub mipmaps: bool,
    pub mip_scale: f32,
    pub perceptual: bool,
    pub force_alpha: bool,
}

/// Dynamically loaded Basis Universal wrapper library.
pub struct BasisLibrary {
    /// Must outlive the resolved symbols.
    _lib: Library,
    encode: EncodeFn,
    free: FreeFn,
}

// SAFETY: the wrapper's entry points carry no thread-local state; callers
// serialize encode calls through the coordinator's lock.
unsafe impl Send for BasisLibrary {}
unsafe impl Sync for BasisLibrary {}

impl std::fmt::Debug for BasisLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasisLibrary").field("loaded", &true).finish()
    }
}

impl BasisLibrary {
    /// Load the wrapper from the default system search path.
    pub fn load() -> Result<Self, String> {
        let name = Self::library_name();
        info!(library = name, "loading basisu wrapper library");

        // SAFETY: loading the well-known wrapper library; its constructors
        // only register the encoder entry points.
        let lib = unsafe { Library::new(name) }
            .map_err(|e| format!("failed to load {name}: {e}"))?;

        // SAFETY: symbol signatures match the wrapper's C header.
        let encode = unsafe { lib.get::<EncodeFn>(b"basisu_encode\0") }
            .map_err(|e| format!("missing symbol basisu_encode: {e}"))?;
        let encode = *encode;
        // SAFETY: as above.
        let free = unsafe { lib.get::<FreeFn>(b"basisu_free\0") }
            .map_err(|e| format!("missing symbol basisu_free: {e}"))?;
        let free = *free;

        debug!("basisu wrapper symbols resolved");
        Ok(Self {
            _lib: lib,
            encode,
            free,
        })
    }

    fn library_name() -> &'static str {
        if cfg!(target_os = "windows") {
            "basisu_wrapper.dll"
        } else if cfg!(target_os = "macos") {
            "libbasisu_wrapper.dylib"
        } else {
            "libbasisu_wrapper.so"
        }
    }

    /// Encode an RGBA8888 buffer. On success returns the wrapper-owned
    /// bitstream pointer and its length; the caller must pass the pointer
    /// to [`BasisLibrary::free`] exactly once. On failure returns the
    /// wrapper's diagnostic text verbatim.
    pub fn encode(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        params: RawEncodeParams,
    ) -> Result<(NonNull<u8>, usize), String> {
        let mut out_len = 0usize;
        let mut diag = [0 as c_char; DIAG_CAPACITY];

        // SAFETY: `pixels` is a live RGBA buffer of exactly
        // `width * height * 4` bytes (checked by the bridge), and the
        // diagnostic buffer outlives the call.
        let ptr = unsafe {
            (self.encode)(
                pixels.as_ptr(),
                width,
                height,
                params.uastc,
                params.ktx2,
                params.compression_level,
                params.quality_level,
                params.mipmaps,
                params.mip_scale,
                params.perceptual,
                params.force_alpha,
                &mut out_len,
                diag.as_mut_ptr(),
                DIAG_CAPACITY,
            )
        };

        match NonNull::new(ptr) {
            Some(p) => Ok((p, out_len)),
            None => Err(diag_to_string(&diag)),
        }
    }

    /// Release a buffer previously returned by [`BasisLibrary::encode`].
    ///
    /// # Safety
    /// `ptr` must originate from a successful `encode` call on this library
    /// and must not have been freed already.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { (self.free)(ptr.as_ptr()) }
    }
}

fn diag_to_string(diag: &[c_char]) -> String {
    let bytes: Vec<u8> = diag
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    if text.is_empty() {
        "native encoder failed without diagnostic".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_name_is_platform_specific() {
        let name = BasisLibrary::library_name();
        if cfg!(target_os = "windows") {
            assert_eq!(name, "basisu_wrapper.dll");
        } else {
            assert!(name.starts_with("libbasisu_wrapper"));
        }
    }

    #[test]
    fn diag_truncates_at_nul() {
        let mut diag = [0 as c_char; 8];
        for (i, b) in b"oops".iter().enumerate() {
            diag[i] = *b as c_char;
        }
        assert_eq!(diag_to_string(&diag), "oops");
    }

    #[test]
    fn empty_diag_gets_fallback_text() {
        let diag = [0 as c_char; 8];
        assert!(diag_to_string(&diag).contains("without diagnostic"));
    }
}
