use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// A face region reported by a detector, after confidence filtering and NMS.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: FaceBox,
    /// Detector confidence in `[0, 1]`.
    pub probability: f64,
    pub landmarks: Option<FaceLandmarks>,
}

/// Domain interface for face detection.
///
/// Implementations may hold mutable inference state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
