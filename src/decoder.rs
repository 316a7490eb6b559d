use crate::error::DecodeError;

/// Storage layout of a single voxel channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    pub bits_allocated: u16,
    pub signed: bool,
}

impl PixelFormat {
    pub const U8: PixelFormat = PixelFormat::new(8, false);
    pub const I8: PixelFormat = PixelFormat::new(8, true);
    pub const U16: PixelFormat = PixelFormat::new(16, false);
    pub const I16: PixelFormat = PixelFormat::new(16, true);

    pub const fn new(bits_allocated: u16, signed: bool) -> Self {
        Self {
            bits_allocated,
            signed,
        }
    }

    /// Bytes per voxel, or `None` if the bit width is not a whole number of
    /// bytes
    pub fn bytes_per_voxel(&self) -> Option<usize> {
        match self.bits_allocated {
            0 => None,
            bits if bits % 8 == 0 => Some(usize::from(bits / 8)),
            _ => None,
        }
    }
}

/// Geometric and calibration fields of one decoded slice
#[derive(Debug, Clone, PartialEq)]
pub struct SliceHeader {
    pub width: u32,
    pub height: u32,
    /// Physical spacing (x, y, z) in millimetres
    pub spacing: (f64, f64, f64),
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub pixel_format: PixelFormat,
    pub series_description: String,
    /// Direction cosines; `orientation[a]` is the patient-space direction of
    /// voxel axis `a` (row direction, column direction, slice normal)
    pub orientation: [[f64; 3]; 3],
    /// Patient-space position of the first voxel
    pub origin: [f64; 3],
}

impl SliceHeader {
    /// Number of bytes a slice with this header must decode to
    pub fn expected_len(&self) -> Option<usize> {
        let bytes = self.pixel_format.bytes_per_voxel()?;
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(bytes)
    }
}

/// Raw pixel bytes plus the header they were decoded with
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSlice {
    pub header: SliceHeader,
    /// Row-major little-endian samples, `width * height * bytes_per_voxel` long
    pub pixels: Vec<u8>,
}

/// Decodes one slice source into raw pixels and header fields.
///
/// Implementations may block and may parallelise internally; the loader calls
/// them strictly one slice at a time.
pub trait SliceDecoder {
    type Source: ?Sized;

    fn decode(&self, source: &Self::Source) -> Result<DecodedSlice, DecodeError>;
}

impl<D: SliceDecoder + ?Sized> SliceDecoder for &D {
    type Source = D::Source;

    fn decode(&self, source: &Self::Source) -> Result<DecodedSlice, DecodeError> {
        (**self).decode(source)
    }
}

pub const IDENTITY_ORIENTATION: [[f64; 3]; 3] =
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
