use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tex_bake_core::codec::{
    shared_encoder, validate_frame, EncodeOptions, EncodedBuffer, SharedEncoder, TextureEncoder,
};
use tex_bake_core::error::{PipelineError, Result};
use tex_bake_core::layout::PageRaster;
use tex_bake_core::writer::{
    write_atomic, BasisPageWriter, JpegPageWriter, PageFileWriter, PngPageWriter, WriteContext,
};

fn solid_page(index: usize, w: u32, h: u32) -> PageRaster {
    PageRaster::new(index, RgbaImage::from_pixel(w, h, Rgba([180, 40, 220, 255])))
}

/// Encoder fake: counts calls, returns a fixed payload whose release is
/// observable through a shared counter.
struct FakeEncoder {
    calls: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    output: Vec<u8>,
    fail: bool,
}

impl FakeEncoder {
    fn shared(output: Vec<u8>, fail: bool) -> (SharedEncoder, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let releases = Arc::new(AtomicUsize::new(0));
        let encoder = FakeEncoder {
            calls: Arc::clone(&calls),
            releases: Arc::clone(&releases),
            output,
            fail,
        };
        (shared_encoder(encoder), calls, releases)
    }
}

impl TextureEncoder for FakeEncoder {
    fn encode(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        _options: &EncodeOptions,
    ) -> Result<EncodedBuffer> {
        validate_frame(pixels, width, height)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Codec("forced encode failure".into()));
        }
        let releases = Arc::clone(&self.releases);
        Ok(EncodedBuffer::with_release_hook(
            self.output.clone(),
            move || {
                releases.fetch_add(1, Ordering::SeqCst);
            },
        ))
    }
}

#[test]
fn atomic_write_creates_parents_and_leaves_no_temp() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nested/deeper/out.bin");
    let written = write_atomic(&dest, b"payload").unwrap();
    assert_eq!(written, 7);
    assert_eq!(std::fs::read(&dest).unwrap(), b"payload");

    let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, ["out.bin"]);
}

#[test]
fn atomic_write_failure_leaves_no_destination() {
    let dir = tempfile::tempdir().unwrap();
    // A directory squatting on the destination makes the rename fail.
    let dest = dir.path().join("blocked.bin");
    std::fs::create_dir(&dest).unwrap();

    let err = write_atomic(&dest, b"payload").unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(dest.is_dir());

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, ["blocked.bin"], "temp file must be cleaned up");
}

#[test]
fn png_writer_produces_a_decodable_file() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("page.png");
    let (encoder, _, _) = FakeEncoder::shared(Vec::new(), false);
    let ctx = WriteContext {
        encoder: &encoder,
        codec_wait_timeout: None,
    };

    let page = solid_page(0, 8, 4);
    let bytes = PngPageWriter.write(&page, &ctx, &dest).unwrap();
    assert!(bytes > 0);

    let decoded = image::open(&dest).unwrap().into_rgba8();
    assert_eq!(decoded.dimensions(), (8, 4));
    assert_eq!(decoded.get_pixel(3, 2), &Rgba([180, 40, 220, 255]));
}

#[test]
fn jpeg_writer_drops_alpha_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("page.jpg");
    let (encoder, _, _) = FakeEncoder::shared(Vec::new(), false);
    let ctx = WriteContext {
        encoder: &encoder,
        codec_wait_timeout: None,
    };

    let writer = JpegPageWriter::new(85);
    assert_eq!(writer.extension(), "jpg");
    let bytes = writer.write(&solid_page(0, 16, 16), &ctx, &dest).unwrap();
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), bytes);

    let decoded = image::open(&dest).unwrap();
    assert_eq!(decoded.width(), 16);
    assert_eq!(decoded.height(), 16);
}

#[test]
fn basis_writer_persists_the_encoded_payload_and_releases_it() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("page.basis");
    let (encoder, calls, releases) = FakeEncoder::shared(vec![7u8; 400], false);
    let ctx = WriteContext {
        encoder: &encoder,
        codec_wait_timeout: None,
    };

    let writer = BasisPageWriter::new(EncodeOptions::default());
    assert_eq!(writer.extension(), "basis");
    let bytes = writer.write(&solid_page(0, 25, 10), &ctx, &dest).unwrap();

    assert_eq!(bytes, 400);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 400]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn basis_writer_releases_the_buffer_when_persisting_fails() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("page.ktx2");
    std::fs::create_dir(&dest).unwrap();

    let (encoder, calls, releases) = FakeEncoder::shared(vec![1, 2, 3], false);
    let ctx = WriteContext {
        encoder: &encoder,
        codec_wait_timeout: None,
    };
    let writer = BasisPageWriter::new(EncodeOptions {
        container: tex_bake_core::codec::Container::Ktx2,
        ..Default::default()
    });

    let err = writer.write(&solid_page(0, 4, 4), &ctx, &dest).unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(releases.load(Ordering::SeqCst), 1, "release must still happen");
}

#[test]
fn basis_writer_surfaces_encode_failures_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("page.basis");
    let (encoder, calls, releases) = FakeEncoder::shared(Vec::new(), true);
    let ctx = WriteContext {
        encoder: &encoder,
        codec_wait_timeout: None,
    };

    let err = BasisPageWriter::new(EncodeOptions::default())
        .write(&solid_page(0, 4, 4), &ctx, &dest)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Codec(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(releases.load(Ordering::SeqCst), 0, "no buffer was handed over");
    assert!(!dest.exists());
}

#[test]
fn basis_writer_honors_the_codec_wait_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("page.basis");
    let (encoder, _, _) = FakeEncoder::shared(vec![0u8; 8], false);

    let held = encoder.lock().unwrap();
    let ctx = WriteContext {
        encoder: &encoder,
        codec_wait_timeout: Some(std::time::Duration::from_millis(20)),
    };
    let err = BasisPageWriter::new(EncodeOptions::default())
        .write(&solid_page(0, 2, 2), &ctx, &dest)
        .unwrap_err();
    drop(held);

    assert!(matches!(err, PipelineError::Codec(_)));
    assert!(!dest.exists());
}
