use ndarray::ArrayView3;
use thiserror::Error;

use crate::shared::face_box::FaceBox;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("crop region lies outside the frame")]
    EmptyCrop,
}

/// A decoded image: contiguous pixel bytes in row-major order.
///
/// Decoding always normalizes to 3-channel RGB so detection and embedding
/// models never see alpha or grayscale inputs.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Decodes an encoded image (JPEG, PNG, WebP, ...) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes)?;
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions { width, height });
        }
        let rgb = image.to_rgb8();
        Ok(Self::new(rgb.into_raw(), width, height, 3))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `bbox`, clamped to frame bounds.
    pub fn crop(&self, bbox: &FaceBox) -> Result<Frame, FrameError> {
        let x1 = bbox.x1.floor().max(0.0) as usize;
        let y1 = bbox.y1.floor().max(0.0) as usize;
        let x2 = (bbox.x2.ceil().max(0.0) as usize).min(self.width as usize);
        let y2 = (bbox.y2.ceil().max(0.0) as usize).min(self.height as usize);
        if x2 <= x1 || y2 <= y1 {
            return Err(FrameError::EmptyCrop);
        }

        let crop_w = x2 - x1;
        let crop_h = y2 - y1;
        let channels = self.channels as usize;
        let row_len = self.width as usize * channels;

        let mut data = Vec::with_capacity(crop_w * crop_h * channels);
        for row in y1..y2 {
            let start = row * row_len + x1 * channels;
            data.extend_from_slice(&self.data[start..start + crop_w * channels]);
        }

        Ok(Frame::new(data, crop_w as u32, crop_h as u32, self.channels))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
