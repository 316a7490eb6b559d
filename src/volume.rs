use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::Pod;
use image::{ImageBuffer, Luma};
use ndarray::Array3;
use rayon::prelude::*;

use crate::decoder::{PixelFormat, SliceHeader};
use crate::error::LoaderError;

/// Write-once geometry and calibration of a volume
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Physical spacing (x, y, z) in millimetres
    pub spacing: (f64, f64, f64),
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub pixel_format: PixelFormat,
    pub series_description: String,
    pub orientation: [[f64; 3]; 3],
    pub origin: [f64; 3],
}

impl VolumeGeometry {
    /// Geometry of a `depth`-slice volume whose schema is fixed by `header`
    pub fn from_header(header: &SliceHeader, depth: u32) -> Self {
        Self {
            width: header.width,
            height: header.height,
            depth,
            spacing: header.spacing,
            rescale_slope: header.rescale_slope,
            rescale_intercept: header.rescale_intercept,
            pixel_format: header.pixel_format,
            series_description: header.series_description.clone(),
            orientation: header.orientation,
            origin: header.origin,
        }
    }

    pub fn bits_allocated(&self) -> u16 {
        self.pixel_format.bits_allocated
    }

    pub fn is_signed(&self) -> bool {
        self.pixel_format.signed
    }

    /// Dimensions as (depth, height, width), the ndarray axis order
    pub fn dim(&self) -> (usize, usize, usize) {
        (
            self.depth as usize,
            self.height as usize,
            self.width as usize,
        )
    }

    /// Patient-space position of the voxel at (x, y, z) indices
    pub fn index_to_world(&self, index: [f64; 3]) -> [f64; 3] {
        let (sx, sy, sz) = self.spacing;
        let scaled = [index[0] * sx, index[1] * sy, index[2] * sz];
        let mut world = self.origin;
        for (axis, direction) in self.orientation.iter().enumerate() {
            for (component, value) in world.iter_mut().enumerate() {
                *value += direction[component] * scaled[axis];
            }
        }
        world
    }

    fn layout(&self) -> Result<(usize, usize), LoaderError> {
        let bytes_per_voxel = self.pixel_format.bytes_per_voxel().ok_or_else(|| {
            LoaderError::unsupported(format!(
                "{} bits allocated is not a whole number of bytes",
                self.bits_allocated()
            ))
        })?;
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(LoaderError::unsupported(format!(
                "empty volume extent {}x{}x{}",
                self.width, self.height, self.depth
            )));
        }
        let slice_len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(bytes_per_voxel))
            .ok_or_else(|| LoaderError::unsupported("slice size overflows"))?;
        let total = slice_len
            .checked_mul(self.depth as usize)
            .ok_or_else(|| LoaderError::unsupported("volume size overflows"))?;
        Ok((slice_len, total))
    }
}

/// Voxel storage that is filled slice by slice while other threads read it.
///
/// Only the [`VolumeWriter`] returned by [`VolumeBuffer::allocate`] can write.
/// Slices are appended in depth order and published through `loaded_slices`
/// with release ordering, so a reader that observes `loaded_slices == n` also
/// observes the bytes of slices `0..n`. Bytes at or above the watermark are
/// never handed out to readers.
pub struct VolumeBuffer {
    geometry: VolumeGeometry,
    slice_len: usize,
    voxels: Box<[UnsafeCell<u8>]>,
    loaded_slices: AtomicUsize,
}

// SAFETY: the single writer only touches bytes above the published watermark
// and readers only ever borrow bytes below it.
unsafe impl Sync for VolumeBuffer {}

impl fmt::Debug for VolumeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeBuffer")
            .field("geometry", &self.geometry)
            .field(
                "voxels",
                &format!("{} of {} slices", self.loaded_slices(), self.geometry.depth),
            )
            .finish()
    }
}

impl VolumeBuffer {
    /// Allocate zeroed storage for `geometry` and hand out its only writer
    pub fn allocate(
        geometry: VolumeGeometry,
    ) -> Result<(Arc<VolumeBuffer>, VolumeWriter), LoaderError> {
        let (slice_len, total) = geometry.layout()?;

        let mut voxels = Vec::new();
        voxels
            .try_reserve_exact(total)
            .map_err(|e| LoaderError::Unavailable {
                reason: format!("cannot allocate {total} voxel bytes: {e}"),
            })?;
        voxels.resize_with(total, || UnsafeCell::new(0));

        let volume = Arc::new(VolumeBuffer {
            geometry,
            slice_len,
            voxels: voxels.into_boxed_slice(),
            loaded_slices: AtomicUsize::new(0),
        });
        let writer = VolumeWriter {
            volume: Arc::clone(&volume),
        };
        Ok((volume, writer))
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn depth(&self) -> u32 {
        self.geometry.depth
    }

    /// Bytes occupied by one depth slice
    pub fn slice_len(&self) -> usize {
        self.slice_len
    }

    pub fn loaded_slices(&self) -> usize {
        self.loaded_slices.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.loaded_slices() == self.geometry.depth as usize
    }

    pub fn fraction_loaded(&self) -> f64 {
        self.loaded_slices() as f64 / f64::from(self.geometry.depth)
    }

    /// Bytes of every published slice, depth-major
    pub fn loaded_voxels(&self) -> &[u8] {
        self.published(self.loaded_slices() * self.slice_len)
    }

    /// Bytes of slice `index`, if it has been published
    pub fn slice(&self, index: usize) -> Option<&[u8]> {
        if index >= self.loaded_slices() {
            return None;
        }
        let start = index * self.slice_len;
        Some(&self.published(start + self.slice_len)[start..])
    }

    fn published(&self, len: usize) -> &[u8] {
        debug_assert!(len <= self.loaded_slices() * self.slice_len);
        // SAFETY: `UnsafeCell<u8>` has the layout of `u8`, and callers only ask
        // for the prefix below the watermark, which the writer never touches
        // again.
        unsafe { std::slice::from_raw_parts(self.voxels.as_ptr().cast::<u8>(), len) }
    }

    /// Stored values as `(depth, height, width)`; unpublished slices are zero.
    ///
    /// `T` must match the voxel width. Stored samples are little-endian and
    /// are converted to host byte order.
    pub fn to_ndarray<T: Pod>(&self) -> Result<Array3<T>, LoaderError> {
        let bytes_per_voxel = self.slice_len / self.voxels_per_slice();
        if size_of::<T>() != bytes_per_voxel {
            return Err(LoaderError::unsupported(format!(
                "cannot view {bytes_per_voxel}-byte voxels as {}-byte values",
                size_of::<T>()
            )));
        }

        let mut values: Vec<T> = bytemuck::pod_collect_to_vec(self.loaded_voxels());
        if cfg!(target_endian = "big") && bytes_per_voxel > 1 {
            bytemuck::cast_slice_mut::<T, u8>(&mut values)
                .chunks_exact_mut(bytes_per_voxel)
                .for_each(<[u8]>::reverse);
        }
        values.resize(self.voxels_per_slice() * self.depth() as usize, T::zeroed());

        Array3::from_shape_vec(self.geometry.dim(), values)
            .map_err(|e| LoaderError::unsupported(e.to_string()))
    }

    /// Calibrated values (`slope * stored + intercept`) as `(depth, height, width)`.
    /// Unpublished slices hold the calibrated value of a zero sample.
    pub fn to_physical(&self) -> Result<Array3<f32>, LoaderError> {
        let format = self.geometry.pixel_format;
        let bytes_per_voxel = self.slice_len / self.voxels_per_slice();
        if !matches!(bytes_per_voxel, 1 | 2 | 4) {
            return Err(LoaderError::unsupported(format!(
                "no calibration for {}-bit samples",
                format.bits_allocated
            )));
        }

        let slope = self.geometry.rescale_slope;
        let intercept = self.geometry.rescale_intercept;
        let mut values: Vec<f32> = self
            .loaded_voxels()
            .par_chunks_exact(bytes_per_voxel)
            .map(|sample| (slope * raw_sample(sample, format.signed) + intercept) as f32)
            .collect();
        values.resize(
            self.voxels_per_slice() * self.depth() as usize,
            intercept as f32,
        );

        Array3::from_shape_vec(self.geometry.dim(), values)
            .map_err(|e| LoaderError::unsupported(e.to_string()))
    }

    /// Published axial slice as an 8-bit image, min/max normalised
    pub fn axial_image(&self, index: usize) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.slice(index)?;
        let format = self.geometry.pixel_format;
        let bytes_per_voxel = self.slice_len / self.voxels_per_slice();
        if !matches!(bytes_per_voxel, 1 | 2 | 4) {
            return None;
        }

        let samples: Vec<f64> = slice
            .par_chunks_exact(bytes_per_voxel)
            .map(|sample| raw_sample(sample, format.signed))
            .collect();
        let (min, max) = samples
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let pixel_data: Vec<u8> = samples
            .into_par_iter()
            .map(|v| normalize_to_u8(v, min, max))
            .collect();
        ImageBuffer::from_raw(self.width(), self.height(), pixel_data)
    }

    fn voxels_per_slice(&self) -> usize {
        self.geometry.width as usize * self.geometry.height as usize
    }
}

#[inline]
fn normalize_to_u8(value: f64, min: f64, max: f64) -> u8 {
    if max <= min {
        return 0;
    }
    (((value - min) / (max - min)) * 255.0).clamp(0.0, 255.0) as u8
}

#[inline]
fn raw_sample(sample: &[u8], signed: bool) -> f64 {
    match (sample, signed) {
        ([b], false) => f64::from(*b),
        ([b], true) => f64::from(*b as i8),
        ([a, b], false) => f64::from(u16::from_le_bytes([*a, *b])),
        ([a, b], true) => f64::from(i16::from_le_bytes([*a, *b])),
        ([a, b, c, d], false) => f64::from(u32::from_le_bytes([*a, *b, *c, *d])),
        ([a, b, c, d], true) => f64::from(i32::from_le_bytes([*a, *b, *c, *d])),
        _ => 0.0,
    }
}

/// Exclusive write access to a [`VolumeBuffer`] during loading
pub struct VolumeWriter {
    volume: Arc<VolumeBuffer>,
}

impl fmt::Debug for VolumeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeWriter")
            .field("volume", &self.volume)
            .finish()
    }
}

impl VolumeWriter {
    pub fn volume(&self) -> &Arc<VolumeBuffer> {
        &self.volume
    }

    /// Copy `bytes` into depth slot `index` and publish it.
    ///
    /// # Panics
    ///
    /// Slices must be appended in depth order: panics if `index` is not the
    /// current `loaded_slices` value, lies beyond the depth, or `bytes` is
    /// not exactly one slice long.
    pub fn write_slice(&mut self, index: usize, bytes: &[u8]) {
        let volume = &*self.volume;
        // Only this writer stores to the counter.
        let loaded = volume.loaded_slices.load(Ordering::Relaxed);
        assert_eq!(
            index, loaded,
            "slice {index} written out of order, {loaded} already loaded"
        );
        assert!(
            index < volume.geometry.depth as usize,
            "slice {index} is beyond volume depth {}",
            volume.geometry.depth
        );
        assert_eq!(
            bytes.len(),
            volume.slice_len,
            "slice {index} has {} bytes, expected {}",
            bytes.len(),
            volume.slice_len
        );

        let start = index * volume.slice_len;
        let target = &volume.voxels[start..start + volume.slice_len];
        // SAFETY: the target lies at or above the watermark, so no reader
        // borrows it, and this writer is the only one.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                UnsafeCell::raw_get(target.as_ptr()),
                bytes.len(),
            );
        }
        volume.loaded_slices.store(index + 1, Ordering::Release);
    }

    /// Give up write access once every slice is loaded
    pub fn finish(self) -> Result<Arc<VolumeBuffer>, VolumeWriter> {
        if self.volume.is_complete() {
            Ok(self.volume)
        } else {
            Err(self)
        }
    }
}
