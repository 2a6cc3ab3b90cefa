//! ArcFace identity embedding extractor using ONNX Runtime.
use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::feature_extractor::FeatureExtractor;
use crate::detection::infrastructure::execution_provider::build_session;
use crate::shared::similarity::l2_normalize;

/// ArcFace models take 112x112 aligned crops.
pub const ARCFACE_INPUT_SIZE: u32 = 112;

pub struct OnnxArcFaceExtractor {
    session: ort::session::Session,
}

impl OnnxArcFaceExtractor {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: build_session(model_path)?,
        })
    }
}

impl FeatureExtractor for OnnxArcFaceExtractor {
    fn input_size(&self) -> u32 {
        ARCFACE_INPUT_SIZE
    }

    fn extract(&mut self, input: Array4<f32>) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let mut embedding = {
            let input_value = ort::value::Tensor::from_array(input)?;
            let outputs = self.session.run(ort::inputs![input_value])?;
            let embedding_array = outputs[0].try_extract_array::<f32>()?;
            embedding_array
                .as_slice()
                .ok_or("Cannot get embedding slice")?
                .to_vec()
        };
        if embedding.is_empty() {
            return Err("Embedding model returned an empty vector".into());
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}
