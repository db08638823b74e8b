//! Wire payload values for flattened samples.
//!
//! Every flattened key maps to one of four payload classes, each with its
//! own archive extension: JPEG images, bincode tensor blobs, plain text,
//! and structured JSON. Blob payloads round-trip bit-identically; images go
//! through the `image` crate's JPEG codec.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use ndarray::{Array3, ArrayD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding or decoding payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("blob codec error: {0}")]
    Blob(#[from] bincode::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("image payload with {0} channels is not encodable (expected 1 or 3)")]
    UnsupportedChannels(usize),

    #[error("payload is not a `{0}`")]
    WrongClass(&'static str),
}

/// A typed tensor value with a self-describing binary encoding.
///
/// The serde representation tags the dtype, so a decoded blob is
/// bit-identical to what was encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
    /// Ragged per-frame list; `None` marks a frame without data.
    RaggedF32(Vec<Option<ArrayD<f32>>>),
    /// Ragged per-frame integer list; `None` marks a frame without data.
    RaggedI64(Vec<Option<ArrayD<i64>>>),
}

impl TensorData {
    /// Encode to the blob wire format.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the blob wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// One camera frame in pixel-major (channel-last) layout: `[width, height, C]`.
///
/// Single-channel frames encode as grayscale JPEG, three-channel frames as
/// RGB. Other channel counts are rejected at encode time.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pixels: Array3<u8>,
}

impl ImagePayload {
    /// Build from a frame-major `[C, width, height]` tensor slice.
    pub fn from_channel_major(frame: Array3<u8>) -> Self {
        let pixels = frame.permuted_axes([1, 2, 0]).as_standard_layout().to_owned();
        Self { pixels }
    }

    /// Build directly from pixel-major `[width, height, C]` data.
    pub fn from_pixel_major(pixels: Array3<u8>) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn channels(&self) -> usize {
        self.pixels.shape()[2]
    }

    /// Pixel-major view of the raw data.
    pub fn pixels(&self) -> &Array3<u8> {
        &self.pixels
    }

    /// Encode to JPEG bytes. Single-channel collapses to grayscale.
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        let (w, h) = (self.width() as u32, self.height() as u32);
        let mut bytes = Vec::new();
        match self.channels() {
            1 => {
                let img = GrayImage::from_fn(w, h, |x, y| {
                    Luma([self.pixels[[x as usize, y as usize, 0]]])
                });
                img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
            }
            3 => {
                let img = RgbImage::from_fn(w, h, |x, y| {
                    Rgb([
                        self.pixels[[x as usize, y as usize, 0]],
                        self.pixels[[x as usize, y as usize, 1]],
                        self.pixels[[x as usize, y as usize, 2]],
                    ])
                });
                img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
            }
            c => return Err(PayloadError::UnsupportedChannels(c)),
        }
        Ok(bytes)
    }
}

/// An encoded payload plus its classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single camera frame, archived as JPEG.
    Image(ImagePayload),
    /// A bincode-encoded [`TensorData`] blob.
    Blob(Vec<u8>),
    /// A plain text field.
    Text(String),
    /// A structured JSON value, emitted verbatim.
    Json(serde_json::Value),
}

impl Payload {
    /// Encode a tensor into a blob payload.
    pub fn tensor(value: &TensorData) -> Result<Self, PayloadError> {
        Ok(Payload::Blob(value.encode()?))
    }

    /// Decode a blob payload back into a tensor.
    pub fn decode_tensor(&self) -> Result<TensorData, PayloadError> {
        match self {
            Payload::Blob(bytes) => TensorData::decode(bytes),
            _ => Err(PayloadError::WrongClass("blob")),
        }
    }

    /// Archive extension for this payload class.
    pub fn extension(&self) -> &'static str {
        match self {
            Payload::Image(_) => "jpeg",
            Payload::Blob(_) => "bin",
            Payload::Text(_) => "txt",
            Payload::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, Array3};

    #[test]
    fn test_tensor_blob_round_trip_is_bit_identical() {
        let original = TensorData::F32(
            Array2::from_shape_vec((2, 3), vec![0.1f32, -2.5, 3.25, f32::MIN, f32::MAX, 0.0])
                .unwrap()
                .into_dyn(),
        );
        let bytes = original.encode().unwrap();
        assert_eq!(TensorData::decode(&bytes).unwrap(), original);
    }

    #[test]
    fn test_ragged_blob_round_trip_keeps_absent_frames() {
        let original = TensorData::RaggedF32(vec![
            Some(Array2::<f32>::zeros((4, 3)).into_dyn()),
            None,
            Some(Array1::from(vec![1.0f32, 2.0]).into_dyn()),
        ]);
        let bytes = original.encode().unwrap();
        assert_eq!(TensorData::decode(&bytes).unwrap(), original);
    }

    #[test]
    fn test_channel_major_conversion() {
        // 2x2 RGB frame, channel-major [3, 2, 2]
        let frame = Array3::from_shape_fn((3, 2, 2), |(c, x, y)| (c * 100 + x * 10 + y) as u8);
        let img = ImagePayload::from_channel_major(frame);
        assert_eq!((img.width(), img.height(), img.channels()), (2, 2, 3));
        assert_eq!(img.pixels()[[1, 0, 2]], 210);
    }

    #[test]
    fn test_jpeg_encode_rgb_and_gray() {
        let rgb = ImagePayload::from_pixel_major(Array3::from_elem((4, 4, 3), 128));
        assert!(!rgb.to_jpeg_bytes().unwrap().is_empty());

        let gray = ImagePayload::from_pixel_major(Array3::from_elem((4, 4, 1), 50));
        assert!(!gray.to_jpeg_bytes().unwrap().is_empty());

        let bad = ImagePayload::from_pixel_major(Array3::from_elem((4, 4, 2), 0));
        assert!(matches!(bad.to_jpeg_bytes(), Err(PayloadError::UnsupportedChannels(2))));
    }

    #[test]
    fn test_payload_extensions() {
        assert_eq!(Payload::Text(String::new()).extension(), "txt");
        assert_eq!(Payload::Json(serde_json::Value::Null).extension(), "json");
        assert_eq!(Payload::Blob(Vec::new()).extension(), "bin");
    }
}
