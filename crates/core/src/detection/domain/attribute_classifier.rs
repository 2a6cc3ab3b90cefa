use crate::detection::domain::face_attributes::{AttributeConfidence, FaceAttributes};
use crate::shared::frame::Frame;

/// Categorical tags for one face with a confidence per category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributePrediction {
    pub attributes: FaceAttributes,
    pub confidence: AttributeConfidence,
}

/// Domain interface for coarse attribute classification of a face crop.
pub trait AttributeClassifier: Send {
    fn classify(&mut self, face: &Frame) -> Result<AttributePrediction, Box<dyn std::error::Error>>;
}
