//! # DICOM-series library
//!
//! This crate loads an ordered series of single-slice DICOM files into one
//! contiguous, calibrated voxel volume, progressively.
//!
//! The first slice fixes the volume's extent, spacing, calibration
//! (rescale slope/intercept), pixel format, orientation and origin. Every
//! following slice is decoded in order, checked against that schema and
//! appended to a [`VolumeBuffer`]. The buffer can be read from other threads
//! while it is being filled: observing `loaded_slices() == n` guarantees that
//! slices `0..n` are completely written.
//!
//! Decoding a single slice is delegated to a [`SliceDecoder`]. The crate ships
//! [`DicomSliceDecoder`], built on the dicom-rs ecosystem; tests and other
//! codecs can plug in their own.
//!
//! Loading assumes:
//!  - one file per slice, already in the desired depth order
//!  - identical width, height, bits allocated and signedness across slices
//!  - no multiframe (the first frame is used)
//!
//! # Examples
//!
//! ## Loading a directory with progress
//!
//! ```no_run
//! # use dicom_series::{SeriesLoader, SourceOptions};
//! let loader = SeriesLoader::default();
//! let volume = loader
//!     .load_series_at_path_with_progress("dicom", &SourceOptions::default(), |progress| {
//!         println!("{:.0}%", progress.fraction * 100.0);
//!     })
//!     .expect("should have loaded the series");
//! let hounsfield = volume.to_physical().expect("16-bit CT is calibratable");
//! println!("{:?}", hounsfield.dim());
//! ```
//!
//! ## Watching a load from another thread
//!
//! ```no_run
//! # use dicom_series::{CancelFlag, SeriesLoader, sources::enumerate_sources, SourceOptions};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = enumerate_sources("dicom", &SourceOptions::default())?;
//! let cancel = CancelFlag::new();
//! let handle = SeriesLoader::default()
//!     .with_cancel_flag(cancel.clone())
//!     .spawn_load(sources, |progress| {
//!         let ready = progress.volume.loaded_voxels();
//!         println!("{} bytes ready", ready.len());
//!     });
//! let volume = handle.await??;
//! assert!(volume.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod dicom_decoder;
pub mod error;
pub mod series_loader;
pub mod sources;
pub mod volume;

pub use decoder::{DecodedSlice, PixelFormat, SliceDecoder, SliceHeader};
pub use dicom_decoder::DicomSliceDecoder;
pub use error::{DecodeError, ErrorCode, LoaderError};
pub use series_loader::{CancelFlag, LoadProgress, SeriesLoader};
pub use sources::{SourceOptions, enumerate_sources};
pub use volume::{VolumeBuffer, VolumeGeometry, VolumeWriter};
