use ndarray::Array4;

/// Domain interface for identity feature extraction.
///
/// Receives an already preprocessed NCHW tensor of shape
/// `[1, 3, input_size, input_size]` and returns a fixed-length vector.
pub trait FeatureExtractor: Send {
    /// Square input resolution the extractor expects.
    fn input_size(&self) -> u32;

    fn extract(&mut self, input: Array4<f32>) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
