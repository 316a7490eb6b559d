//! Command-line configuration for the `dicom-series` binary.
//!
//! Every option can also be set through an environment variable with the
//! `DICOM_SERIES_` prefix:
//!
//! - `DICOM_SERIES_DIR` - directory holding the slice files
//! - `DICOM_SERIES_EXTENSIONS` - comma separated extensions (default: dcm)
//! - `DICOM_SERIES_ALL_FILES` - accept files regardless of extension
//! - `DICOM_SERIES_PREVIEW` - PNG path for the middle axial slice

use std::path::PathBuf;

use clap::Parser;

use crate::sources::SourceOptions;

/// Default extension of slice files.
pub const DEFAULT_EXTENSION: &str = "dcm";

/// Load a DICOM series into a voxel volume and report its geometry.
#[derive(Parser, Debug, Clone)]
#[command(name = "dicom-series")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing one file per slice.
    #[arg(env = "DICOM_SERIES_DIR")]
    pub directory: PathBuf,

    /// File extensions treated as slices.
    #[arg(
        short,
        long = "extension",
        env = "DICOM_SERIES_EXTENSIONS",
        value_delimiter = ',',
        default_value = DEFAULT_EXTENSION
    )]
    pub extensions: Vec<String>,

    /// Treat every regular file in the directory as a slice.
    #[arg(long, env = "DICOM_SERIES_ALL_FILES")]
    pub all_files: bool,

    /// Write the middle axial slice to this PNG file.
    #[arg(long, env = "DICOM_SERIES_PREVIEW")]
    pub preview: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            extensions: self.extensions.clone(),
            accept_all: self.all_files,
        }
    }
}
