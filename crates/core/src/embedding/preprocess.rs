//! Whole-image tensor preparation for the embedding extractor.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

use crate::shared::frame::Frame;

const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

/// Resizes the whole frame to `size`x`size` and scales pixels to `[-1, 1]`,
/// NCHW layout.
pub fn canonical_tensor(frame: &Frame, size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    let Some(rgb) = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec()) else {
        return tensor;
    };
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - NORM_MEAN) / NORM_STD;
        }
    }
    tensor
}
