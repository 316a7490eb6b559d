//! Fake slice decoder and fixtures shared by the integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dicom_series::decoder::IDENTITY_ORIENTATION;
use dicom_series::{DecodeError, DecodedSlice, PixelFormat, SliceDecoder, SliceHeader};

/// What the fake decoder produces for one source
#[derive(Debug, Clone)]
pub enum FakeSource {
    /// A well-formed slice whose pixels are derived from `seed`
    Slice { header: SliceHeader, seed: u8 },
    /// A slice whose pixel buffer is one byte short
    Truncated { header: SliceHeader },
    Native(&'static str),
    Unsupported(&'static str),
    Unavailable,
}

/// Decoder over [`FakeSource`]s that counts its calls
#[derive(Debug, Default)]
pub struct FakeDecoder {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every decode call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SliceDecoder for FakeDecoder {
    type Source = FakeSource;

    fn decode(&self, source: &FakeSource) -> Result<DecodedSlice, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match source {
            FakeSource::Slice { header, seed } => Ok(DecodedSlice {
                header: header.clone(),
                pixels: pattern(header, *seed),
            }),
            FakeSource::Truncated { header } => {
                let mut pixels = pattern(header, 0);
                pixels.pop();
                Ok(DecodedSlice {
                    header: header.clone(),
                    pixels,
                })
            }
            FakeSource::Native(detail) => Err(DecodeError::native(std::io::Error::other(*detail))),
            FakeSource::Unsupported(reason) => Err(DecodeError::unsupported(*reason)),
            FakeSource::Unavailable => Err(DecodeError::Unavailable {
                reason: "codec not compiled in".to_string(),
            }),
        }
    }
}

/// Decoder that treats the raw bytes of each file as a 2x2 8-bit slice
#[derive(Debug, Default)]
pub struct RawFileDecoder;

impl SliceDecoder for RawFileDecoder {
    type Source = Path;

    fn decode(&self, source: &Path) -> Result<DecodedSlice, DecodeError> {
        let pixels = std::fs::read(source).map_err(DecodeError::native)?;
        Ok(DecodedSlice {
            header: header(2, 2, PixelFormat::U8),
            pixels,
        })
    }
}

/// A CT-like header with the given extent and pixel format
pub fn header(width: u32, height: u32, pixel_format: PixelFormat) -> SliceHeader {
    SliceHeader {
        width,
        height,
        spacing: (0.7, 0.7, 1.25),
        rescale_slope: 1.0,
        rescale_intercept: -1024.0,
        pixel_format,
        series_description: "AXIAL 1.25mm".to_string(),
        orientation: IDENTITY_ORIENTATION,
        origin: [-180.0, -175.5, 42.0],
    }
}

/// Pixel bytes the fake decoder produces for `header` and `seed`
pub fn pattern(header: &SliceHeader, seed: u8) -> Vec<u8> {
    let len = header.expected_len().expect("test headers are byte aligned");
    (0..len)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed.wrapping_mul(31)))
        .collect()
}

/// `count` consistent slices; slice `i` uses seed `i`
pub fn consistent_series(count: usize, header: &SliceHeader) -> Vec<FakeSource> {
    (0..count)
        .map(|i| FakeSource::Slice {
            header: header.clone(),
            seed: i as u8,
        })
        .collect()
}
