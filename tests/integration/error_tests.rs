use std::error::Error;
use std::sync::Arc;

use dicom_series::{ErrorCode, LoaderError, PixelFormat, SeriesLoader, SliceHeader, VolumeBuffer};

use super::test_utils::{FakeDecoder, FakeSource, consistent_series, header};

/// Load `sources`, returning the error, the progress call count and the
/// volume shown to the callback, if any
fn load_failing(sources: &[FakeSource]) -> (LoaderError, usize, Option<Arc<VolumeBuffer>>) {
    let mut calls = 0;
    let mut captured = None;
    let err = SeriesLoader::new(FakeDecoder::new())
        .load_series_with_progress(sources, |progress| {
            calls += 1;
            captured = Some(Arc::clone(progress.volume));
        })
        .expect_err("load should fail");
    (err, calls, captured)
}

fn series_with_odd_slice(count: usize, k: usize, odd: SliceHeader) -> Vec<FakeSource> {
    let mut sources = consistent_series(count, &header(4, 4, PixelFormat::I16));
    sources[k] = FakeSource::Slice {
        header: odd,
        seed: k as u8,
    };
    sources
}

#[test]
fn empty_series_reports_no_files() {
    let sources: Vec<FakeSource> = Vec::new();

    let (err, calls, captured) = load_failing(&sources);

    assert!(matches!(err, LoaderError::NoFiles));
    assert_eq!(err.code(), ErrorCode::NoFiles);
    assert_eq!(calls, 0);
    assert!(captured.is_none());
}

#[test]
fn mismatched_slice_is_unsupported_format() {
    let base = header(4, 4, PixelFormat::I16);
    let mut wider = base.clone();
    wider.width = 5;
    let mut taller = base.clone();
    taller.height = 2;
    let mut eight_bit = base.clone();
    eight_bit.pixel_format = PixelFormat::I8;
    let mut unsigned = base.clone();
    unsigned.pixel_format = PixelFormat::U16;

    for (odd, field) in [
        (wider, "width"),
        (taller, "height"),
        (eight_bit, "bits allocated"),
        (unsigned, "signedness"),
    ] {
        let k = 3;
        let (err, calls, captured) = load_failing(&series_with_odd_slice(6, k, odd));

        assert_eq!(err.code(), ErrorCode::UnsupportedFormat, "{field}");
        assert!(err.to_string().contains(field), "{err} should name {field}");
        assert!(err.to_string().contains("slice 3"), "{err}");
        assert_eq!(calls, k, "{field}");
        let volume = captured.expect("earlier slices were reported");
        assert_eq!(volume.loaded_slices(), k, "{field}");
        assert!(!volume.is_complete());
    }
}

#[test]
fn first_slice_failure_allocates_nothing() {
    for (source, code) in [
        (FakeSource::Native("corrupt JPEG stream"), ErrorCode::Native),
        (FakeSource::Unsupported("12 bits allocated"), ErrorCode::UnsupportedFormat),
        (FakeSource::Unavailable, ErrorCode::Unavailable),
    ] {
        let mut sources = consistent_series(3, &header(2, 2, PixelFormat::U8));
        sources[0] = source;
        let loader = SeriesLoader::new(FakeDecoder::new());
        let mut calls = 0;

        let err = loader
            .load_series_with_progress(&sources, |_| calls += 1)
            .expect_err("first slice fails");

        assert_eq!(err.code(), code);
        assert_eq!(calls, 0);
        assert_eq!(loader.decoder().calls(), 1, "loading stops at the first failure");
    }
}

#[test]
fn later_decoder_failure_aborts_with_detail() {
    let mut sources = consistent_series(5, &header(2, 2, PixelFormat::U8));
    sources[2] = FakeSource::Native("inflate: invalid distance");

    let (err, calls, captured) = load_failing(&sources);

    assert!(matches!(err, LoaderError::Native { .. }));
    let source = err.source().expect("native failure keeps its cause");
    assert_eq!(source.to_string(), "inflate: invalid distance");
    assert_eq!(calls, 2);
    assert_eq!(captured.map(|v| v.loaded_slices()), Some(2));
}

#[test]
fn truncated_pixel_data_is_unsupported_format() {
    let base = header(3, 3, PixelFormat::U16);
    let mut sources = consistent_series(3, &base);
    sources[1] = FakeSource::Truncated { header: base };

    let (err, calls, _) = load_failing(&sources);

    assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    assert!(err.to_string().contains("expected 18"), "{err}");
    assert_eq!(calls, 1);
}

#[test]
fn truncated_first_slice_allocates_nothing() {
    let sources = vec![FakeSource::Truncated {
        header: header(2, 2, PixelFormat::U8),
    }];

    let (err, calls, captured) = load_failing(&sources);

    assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    assert_eq!(calls, 0);
    assert!(captured.is_none());
}
