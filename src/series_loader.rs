use std::borrow::Borrow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::decoder::{DecodedSlice, SliceDecoder, SliceHeader};
use crate::dicom_decoder::DicomSliceDecoder;
use crate::error::LoaderError;
use crate::sources::{SourceOptions, enumerate_sources};
use crate::volume::{VolumeBuffer, VolumeGeometry, VolumeWriter};

/// Snapshot handed to the progress callback after a slice is published
#[derive(Debug, Clone, Copy)]
pub struct LoadProgress<'a> {
    /// `slices_loaded / depth`
    pub fraction: f64,
    pub slices_loaded: usize,
    /// Raw bytes of the slice just written
    pub latest_slice: Option<&'a [u8]>,
    /// The volume being filled; only `slices_loaded` slices are valid yet
    pub volume: &'a Arc<VolumeBuffer>,
}

/// Cooperative cancellation shared between a loader and its owner.
///
/// The loader checks the flag before decoding each slice.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Assembles an ordered list of slice sources into one [`VolumeBuffer`].
///
/// The first slice fixes the geometry, calibration and pixel format of the
/// whole volume; every later slice must match its extent and pixel format
/// exactly. Slices are decoded one after another in the order given.
pub struct SeriesLoader<D> {
    decoder: D,
    cancel: Option<CancelFlag>,
}

impl Default for SeriesLoader<DicomSliceDecoder> {
    fn default() -> Self {
        Self::new(DicomSliceDecoder::new())
    }
}

impl<D: SliceDecoder> SeriesLoader<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            cancel: None,
        }
    }

    /// Abort loads with [`LoaderError::Cancelled`] once `flag` is set
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Load a series without progress reporting
    pub fn load_series<S>(&self, sources: &[S]) -> Result<Arc<VolumeBuffer>, LoaderError>
    where
        S: Borrow<D::Source>,
    {
        self.load_series_with_progress(sources, |_| {})
    }

    /// Load a series, calling `on_progress` on this thread after each slice
    /// is written and published, the first slice included.
    ///
    /// # Errors
    ///
    /// - [`LoaderError::NoFiles`] if `sources` is empty
    /// - [`LoaderError::UnsupportedFormat`] if a slice is unsupported or does
    ///   not match the first slice
    /// - [`LoaderError::Native`] / [`LoaderError::Unavailable`] if the decoder
    ///   fails
    /// - [`LoaderError::Cancelled`] if the cancel flag was raised
    ///
    /// Progress already reported is not retracted on failure; the volume
    /// shown to the callback must then be treated as invalid.
    pub fn load_series_with_progress<S, F>(
        &self,
        sources: &[S],
        mut on_progress: F,
    ) -> Result<Arc<VolumeBuffer>, LoaderError>
    where
        S: Borrow<D::Source>,
        F: FnMut(LoadProgress<'_>),
    {
        let started = Instant::now();
        let result = self.load(sources, &mut on_progress);
        match &result {
            Ok(volume) => info!(
                slices = volume.depth(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "series loaded"
            ),
            Err(LoaderError::Cancelled) => warn!("series load cancelled"),
            Err(e) => warn!(code = %e.code(), "series load failed: {e}"),
        }
        result
    }

    fn load<S, F>(
        &self,
        sources: &[S],
        on_progress: &mut F,
    ) -> Result<Arc<VolumeBuffer>, LoaderError>
    where
        S: Borrow<D::Source>,
        F: FnMut(LoadProgress<'_>),
    {
        let Some((first_source, rest)) = sources.split_first() else {
            return Err(LoaderError::NoFiles);
        };
        let depth = u32::try_from(sources.len())
            .map_err(|_| LoaderError::unsupported(format!("{} slices", sources.len())))?;

        let first = self.decode_slice(0, first_source.borrow())?;
        let geometry = VolumeGeometry::from_header(&first.header, depth);
        info!(
            width = geometry.width,
            height = geometry.height,
            depth,
            bits_allocated = geometry.bits_allocated(),
            signed = geometry.is_signed(),
            spacing = ?geometry.spacing,
            description = %geometry.series_description,
            "allocating volume"
        );
        let (volume, mut writer) = VolumeBuffer::allocate(geometry)?;

        Self::publish(&mut writer, 0, &first.pixels, on_progress);
        drop(first);

        for (offset, source) in rest.iter().enumerate() {
            let index = offset + 1;
            let slice = self.decode_slice(index, source.borrow())?;
            Self::validate(volume.geometry(), index, &slice.header)?;
            Self::publish(&mut writer, index, &slice.pixels, on_progress);
        }

        writer.finish().map_err(|writer| {
            LoaderError::unsupported(format!(
                "only {} of {depth} slices loaded",
                writer.volume().loaded_slices()
            ))
        })
    }

    fn decode_slice(
        &self,
        index: usize,
        source: &D::Source,
    ) -> Result<DecodedSlice, LoaderError> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(LoaderError::Cancelled);
        }

        let slice = self.decoder.decode(source).map_err(|e| {
            debug!(index, "slice decode failed: {e}");
            LoaderError::from(e)
        })?;

        let expected = slice.header.expected_len().ok_or_else(|| {
            LoaderError::unsupported(format!(
                "slice {index}: {} bits allocated is not byte aligned",
                slice.header.pixel_format.bits_allocated
            ))
        })?;
        if slice.pixels.len() != expected {
            return Err(LoaderError::unsupported(format!(
                "slice {index}: decoded {} bytes, expected {expected}",
                slice.pixels.len()
            )));
        }
        debug!(index, bytes = slice.pixels.len(), "decoded slice");
        Ok(slice)
    }

    fn validate(
        geometry: &VolumeGeometry,
        index: usize,
        header: &SliceHeader,
    ) -> Result<(), LoaderError> {
        let mismatch = |field: &str, expected: String, found: String| {
            Err(LoaderError::unsupported(format!(
                "slice {index}: {field} is {found}, series has {expected}"
            )))
        };

        if header.width != geometry.width {
            return mismatch("width", geometry.width.to_string(), header.width.to_string());
        }
        if header.height != geometry.height {
            return mismatch("height", geometry.height.to_string(), header.height.to_string());
        }
        let format = header.pixel_format;
        if format.bits_allocated != geometry.bits_allocated() {
            return mismatch(
                "bits allocated",
                geometry.bits_allocated().to_string(),
                format.bits_allocated.to_string(),
            );
        }
        if format.signed != geometry.is_signed() {
            return mismatch(
                "signedness",
                geometry.is_signed().to_string(),
                format.signed.to_string(),
            );
        }
        Ok(())
    }

    fn publish<F>(writer: &mut VolumeWriter, index: usize, pixels: &[u8], on_progress: &mut F)
    where
        F: FnMut(LoadProgress<'_>),
    {
        writer.write_slice(index, pixels);

        let volume = writer.volume();
        let slices_loaded = index + 1;
        on_progress(LoadProgress {
            fraction: slices_loaded as f64 / f64::from(volume.depth()),
            slices_loaded,
            latest_slice: Some(pixels),
            volume,
        });
    }
}

impl<D> SeriesLoader<D>
where
    D: SliceDecoder<Source = Path>,
{
    /// Load every slice file found in `dir`
    pub fn load_series_at_path(
        &self,
        dir: impl AsRef<Path>,
        options: &SourceOptions,
    ) -> Result<Arc<VolumeBuffer>, LoaderError> {
        self.load_series_at_path_with_progress(dir, options, |_| {})
    }

    pub fn load_series_at_path_with_progress<F>(
        &self,
        dir: impl AsRef<Path>,
        options: &SourceOptions,
        on_progress: F,
    ) -> Result<Arc<VolumeBuffer>, LoaderError>
    where
        F: FnMut(LoadProgress<'_>),
    {
        let sources = enumerate_sources(dir, options)?;
        self.load_series_with_progress(&sources, on_progress)
    }
}

impl<D> SeriesLoader<D>
where
    D: SliceDecoder + Send + 'static,
{
    /// Run a load on tokio's blocking pool; must be called inside a runtime
    pub fn spawn_load<S, F>(
        self,
        sources: Vec<S>,
        on_progress: F,
    ) -> JoinHandle<Result<Arc<VolumeBuffer>, LoaderError>>
    where
        S: Borrow<D::Source> + Send + 'static,
        F: FnMut(LoadProgress<'_>) + Send + 'static,
    {
        tokio::task::spawn_blocking(move || self.load_series_with_progress(&sources, on_progress))
    }
}
