use std::path::Path;

use dicom::{
    core::Tag,
    encoding::TransferSyntaxIndex,
    object::{DefaultDicomObject, open_file},
    pixeldata::PixelDecoder,
    transfer_syntax::TransferSyntaxRegistry,
};
use dicom_dictionary_std::tags;
use tracing::trace;

use crate::decoder::{
    DecodedSlice, IDENTITY_ORIENTATION, PixelFormat, SliceDecoder, SliceHeader,
};
use crate::error::DecodeError;

/// [`SliceDecoder`] reading single-frame DICOM files with dicom-rs.
///
/// Multi-frame objects contribute their first frame only.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomSliceDecoder;

impl DicomSliceDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode an already opened DICOM object
    pub fn decode_object(
        &self,
        dicom_object: &DefaultDicomObject,
    ) -> Result<DecodedSlice, DecodeError> {
        Self::check_transfer_syntax(dicom_object)?;
        let header = Self::read_header(dicom_object)?;
        let expected = header
            .expected_len()
            .ok_or_else(|| DecodeError::unsupported("slice size overflows"))?;

        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(DecodeError::native)?;
        let data = pixel_data.data();
        if data.len() < expected {
            return Err(DecodeError::Malformed {
                reason: format!(
                    "pixel data holds {} bytes, one frame needs {expected}",
                    data.len()
                ),
            });
        }

        Ok(DecodedSlice {
            header,
            pixels: data[..expected].to_vec(),
        })
    }

    /// Pixel data can only be decoded when the transfer syntax is registered
    /// and its pixel codec was compiled in
    fn check_transfer_syntax(dicom_object: &DefaultDicomObject) -> Result<(), DecodeError> {
        let uid = dicom_object
            .meta()
            .transfer_syntax()
            .trim_end_matches(['\0', ' ']);
        match TransferSyntaxRegistry.get(uid) {
            None => Err(DecodeError::Unavailable {
                reason: format!("transfer syntax {uid} is not registered"),
            }),
            Some(ts) if !ts.can_decode_all() => Err(DecodeError::Unavailable {
                reason: format!("no pixel data decoder for {} ({uid})", ts.name()),
            }),
            Some(_) => Ok(()),
        }
    }

    fn read_header(dicom_object: &DefaultDicomObject) -> Result<SliceHeader, DecodeError> {
        let rows = Self::get_int(dicom_object, tags::ROWS).ok_or_else(|| DecodeError::Malformed {
            reason: "missing Rows".to_string(),
        })?;
        let columns =
            Self::get_int(dicom_object, tags::COLUMNS).ok_or_else(|| DecodeError::Malformed {
                reason: "missing Columns".to_string(),
            })?;

        let samples_per_pixel = Self::get_int(dicom_object, tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        if samples_per_pixel != 1 {
            return Err(DecodeError::unsupported(format!(
                "{samples_per_pixel} samples per pixel, only monochrome is supported"
            )));
        }

        let bits_allocated = Self::get_int(dicom_object, tags::BITS_ALLOCATED)
            .ok_or_else(|| DecodeError::unsupported("missing BitsAllocated"))?;
        if !matches!(bits_allocated, 8 | 16) {
            return Err(DecodeError::unsupported(format!(
                "{bits_allocated} bits allocated, expected 8 or 16"
            )));
        }
        let signed = Self::get_int(dicom_object, tags::PIXEL_REPRESENTATION) == Some(1);

        let (spacing_y, spacing_x) = Self::get_floats(dicom_object, tags::PIXEL_SPACING)
            .filter(|v| v.len() >= 2)
            .map(|v| (v[0], v[1]))
            .ok_or_else(|| DecodeError::unsupported("missing PixelSpacing"))?;
        let spacing_z = Self::get_float(dicom_object, tags::SPACING_BETWEEN_SLICES)
            .or_else(|| Self::get_float(dicom_object, tags::SLICE_THICKNESS))
            .ok_or_else(|| {
                DecodeError::unsupported("missing SpacingBetweenSlices and SliceThickness")
            })?;

        let orientation = Self::get_floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .filter(|v| v.len() == 6)
            .map(|v| direction_cosines([v[0], v[1], v[2]], [v[3], v[4], v[5]]))
            .unwrap_or(IDENTITY_ORIENTATION);
        let origin = Self::get_floats(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .filter(|v| v.len() == 3)
            .map(|v| [v[0], v[1], v[2]])
            .unwrap_or([0.0; 3]);

        let series_description = dicom_object
            .element(tags::SERIES_DESCRIPTION)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let header = SliceHeader {
            width: columns,
            height: rows,
            spacing: (spacing_x, spacing_y, spacing_z),
            rescale_slope: Self::get_float(dicom_object, tags::RESCALE_SLOPE).unwrap_or(1.0),
            rescale_intercept: Self::get_float(dicom_object, tags::RESCALE_INTERCEPT)
                .unwrap_or(0.0),
            pixel_format: PixelFormat::new(bits_allocated as u16, signed),
            series_description,
            orientation,
            origin,
        };
        trace!(?header, "read slice header");
        Ok(header)
    }

    fn get_int(dicom_object: &DefaultDicomObject, tag: Tag) -> Option<u32> {
        dicom_object.element(tag).ok()?.to_int::<u32>().ok()
    }

    fn get_float(dicom_object: &DefaultDicomObject, tag: Tag) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_floats(dicom_object: &DefaultDicomObject, tag: Tag) -> Option<Vec<f64>> {
        dicom_object.element(tag).ok()?.to_multi_float64().ok()
    }
}

impl SliceDecoder for DicomSliceDecoder {
    type Source = Path;

    fn decode(&self, source: &Path) -> Result<DecodedSlice, DecodeError> {
        let dicom_object = open_file(source).map_err(DecodeError::native)?;
        self.decode_object(&dicom_object)
    }
}

/// Orientation matrix from the row and column direction cosines, completed
/// with their cross product as the slice normal
fn direction_cosines(row: [f64; 3], column: [f64; 3]) -> [[f64; 3]; 3] {
    let normal = [
        row[1] * column[2] - row[2] * column[1],
        row[2] * column[0] - row[0] * column[2],
        row[0] * column[1] - row[1] * column[0],
    ];
    [row, column, normal]
}
