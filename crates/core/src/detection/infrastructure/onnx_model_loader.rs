use std::path::PathBuf;

use crate::detection::domain::attribute_classifier::AttributeClassifier;
use crate::detection::infrastructure::onnx_arcface_extractor::OnnxArcFaceExtractor;
use crate::detection::infrastructure::onnx_attribute_classifier::OnnxAttributeClassifier;
use crate::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use crate::detection::model_provider::{LoadedModels, ModelLoader};
use crate::shared::config::FaceIndexConfig;
use crate::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use crate::shared::model_resolver;

/// Loads the ONNX detector, embedder and optional attribute heads.
#[derive(Clone, Debug)]
pub struct OnnxModelLoader {
    pub model_dir: Option<PathBuf>,
    pub attribute_model_dir: Option<PathBuf>,
    pub min_confidence: f64,
}

impl OnnxModelLoader {
    pub fn from_config(config: &FaceIndexConfig) -> Self {
        Self {
            model_dir: config.model_dir.clone(),
            attribute_model_dir: config.attribute_model_dir.clone(),
            min_confidence: config.min_confidence,
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<LoadedModels, Box<dyn std::error::Error>> {
        let bundled = self.model_dir.as_deref();
        let yolo_path = model_resolver::resolve(YOLO_MODEL_NAME, YOLO_MODEL_URL, bundled, None)?;
        let embedding_path =
            model_resolver::resolve(EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, bundled, None)?;

        let detector = OnnxYoloDetector::new(&yolo_path, self.min_confidence)?;
        let extractor = OnnxArcFaceExtractor::new(&embedding_path)?;

        let attribute_dir = self.attribute_model_dir.as_deref().or(bundled);
        let classifier = match attribute_dir {
            Some(dir) => OnnxAttributeClassifier::from_dir(dir)?
                .map(|c| Box::new(c) as Box<dyn AttributeClassifier>),
            None => None,
        };
        if classifier.is_none() {
            log::info!("No attribute models installed; attributes will be Unknown");
        }

        Ok(LoadedModels {
            detector: Box::new(detector),
            extractor: Box::new(extractor),
            classifier,
        })
    }
}
