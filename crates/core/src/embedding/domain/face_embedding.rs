use serde::{Deserialize, Serialize};

use crate::detection::domain::face_attributes::{AttributeConfidence, FaceAttributes};
use crate::detection::domain::face_landmarks::FaceLandmarks;

/// One detected face inside an embedded image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub top_left: [f64; 2],
    pub bottom_right: [f64; 2],
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<FaceAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_confidence: Option<AttributeConfidence>,
    /// Five `[x, y]` points: left eye, right eye, nose, left mouth, right mouth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<[f64; 2]>>,
}

impl Prediction {
    pub fn landmarks(&self) -> Option<FaceLandmarks> {
        self.landmarks.as_deref().and_then(FaceLandmarks::from_pairs)
    }

    /// Landmark alignment quality, 0.0 without landmarks.
    pub fn alignment_score(&self) -> f64 {
        self.landmarks()
            .map(|lm| lm.alignment_score())
            .unwrap_or(0.0)
    }
}

/// The persisted descriptor of one source image.
///
/// `predictions` is ordered by descending probability, so the first entry is
/// the representative face whose attributes stand for the whole image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceEmbedding {
    /// Source image identity. Empty until the caller assigns it.
    #[serde(default)]
    pub path: String,
    pub embedding: Vec<f32>,
    pub faces: usize,
    /// RFC 3339 generation timestamp.
    pub cached: String,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

impl FaceEmbedding {
    /// `predictions.len() == faces` and a vector exists iff there are faces.
    pub fn is_well_formed(&self) -> bool {
        self.predictions.len() == self.faces && self.embedding.is_empty() == (self.faces == 0)
    }

    pub fn representative(&self) -> Option<&Prediction> {
        self.predictions.first()
    }

    /// Attribute signature of the image, `Unknown` at neutral confidence when
    /// the representative face carries none.
    pub fn attribute_signature(&self) -> (FaceAttributes, AttributeConfidence) {
        match self.representative() {
            Some(p) => (
                p.attributes.unwrap_or_default(),
                p.attribute_confidence.unwrap_or_default(),
            ),
            None => (FaceAttributes::default(), AttributeConfidence::default()),
        }
    }

    pub fn alignment_score(&self) -> f64 {
        self.representative()
            .map(Prediction::alignment_score)
            .unwrap_or(0.0)
    }
}
