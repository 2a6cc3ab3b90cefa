//! Image bytes to a single `FaceEmbedding` record.
//!
//! The generator is pure with respect to persistence: it never touches the
//! cache directory and never assigns `path`. Results are memoized by the
//! BLAKE3 hash of the input bytes.

use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::attribute_classifier::AttributePrediction;
use crate::detection::domain::face_detector::Detection;
use crate::detection::infrastructure::onnx_model_loader::OnnxModelLoader;
use crate::detection::model_provider::{LoadedModels, ModelProvider, ModelProviderError};
use crate::embedding::domain::face_embedding::{FaceEmbedding, Prediction};
use crate::embedding::preprocess::canonical_tensor;
use crate::shared::bounded_cache::BoundedCache;
use crate::shared::config::FaceIndexConfig;
use crate::shared::constants::FACE_CROP_PADDING;
use crate::shared::frame::{Frame, FrameError};

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] FrameError),
    #[error("model inference failed: {0}")]
    ModelInference(String),
    #[error("models unavailable: {0}")]
    ModelUnavailable(#[from] ModelProviderError),
}

/// Anything that turns encoded image bytes into an embedding record.
///
/// `Ok(None)` means the image is valid but contains no face.
pub trait FaceEmbedder: Send {
    fn generate(&mut self, image_bytes: &[u8]) -> Result<Option<FaceEmbedding>, EmbeddingError>;
}

type CropKey = (String, usize);

pub struct EmbeddingGenerator {
    provider: ModelProvider,
    results: BoundedCache<String, Option<FaceEmbedding>>,
    face_crops: BoundedCache<CropKey, Frame>,
}

impl EmbeddingGenerator {
    pub fn new(provider: ModelProvider, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            provider,
            results: BoundedCache::new(cache_capacity, cache_ttl),
            face_crops: BoundedCache::new(cache_capacity, cache_ttl),
        }
    }

    pub fn from_config(provider: ModelProvider, config: &FaceIndexConfig) -> Self {
        Self::new(
            provider,
            config.result_cache_capacity,
            Duration::from_secs(config.result_cache_ttl_secs),
        )
    }

    /// Generator over the ONNX models named in `config`, already initialized.
    pub fn with_onnx_models(config: &FaceIndexConfig) -> Result<Self, EmbeddingError> {
        let loader = OnnxModelLoader::from_config(config);
        let mut generator = Self::from_config(ModelProvider::new(Box::new(loader)), config);
        generator.initialize()?;
        Ok(generator)
    }

    pub fn initialize(&mut self) -> Result<(), EmbeddingError> {
        self.provider.initialize()?;
        Ok(())
    }

    /// Releases the models and every memoized result.
    pub fn dispose(&mut self) {
        self.provider.dispose();
        self.results.clear();
        self.face_crops.clear();
    }

    fn compute(&mut self, key: &str, image_bytes: &[u8]) -> Result<Option<FaceEmbedding>, EmbeddingError> {
        let frame = Frame::decode(image_bytes)?;
        let Self {
            provider,
            face_crops,
            ..
        } = self;
        let models = provider.models_mut()?;

        let mut detections = models
            .detector
            .detect(&frame)
            .map_err(|e| EmbeddingError::ModelInference(e.to_string()))?;
        if detections.is_empty() {
            return Ok(None);
        }

        for (idx, det) in detections.iter_mut().enumerate() {
            if det.probability == 0.0 {
                det.probability = recover_probability(models, face_crops, key, idx, &frame, det);
            }
        }

        let mut predictions: Vec<Prediction> = detections
            .iter()
            .enumerate()
            .map(|(idx, det)| predict_face(models, face_crops, key, idx, &frame, det))
            .collect();
        predictions.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let embedding = {
            let input = canonical_tensor(&frame, models.extractor.input_size());
            models
                .extractor
                .extract(input)
                .map_err(|e| EmbeddingError::ModelInference(e.to_string()))?
        };
        if embedding.is_empty() {
            return Err(EmbeddingError::ModelInference(
                "extractor returned an empty vector".into(),
            ));
        }

        Ok(Some(FaceEmbedding {
            path: String::new(),
            embedding,
            faces: predictions.len(),
            cached: chrono::Utc::now().to_rfc3339(),
            predictions,
        }))
    }
}

impl FaceEmbedder for EmbeddingGenerator {
    fn generate(&mut self, image_bytes: &[u8]) -> Result<Option<FaceEmbedding>, EmbeddingError> {
        let key = blake3::hash(image_bytes).to_hex().to_string();
        if let Some(hit) = self.results.get(&key) {
            log::trace!("Embedding cache hit {}", &key[..8]);
            return Ok(hit);
        }
        let result = self.compute(&key, image_bytes)?;
        self.results.insert(key, result.clone());
        Ok(result)
    }
}

/// Padded crop of face `idx`, memoized per input buffer.
fn face_crop(
    crops: &mut BoundedCache<CropKey, Frame>,
    key: &str,
    idx: usize,
    frame: &Frame,
    det: &Detection,
) -> Result<Frame, FrameError> {
    let crop_key = (key.to_string(), idx);
    if let Some(crop) = crops.get(&crop_key) {
        return Ok(crop);
    }
    let padded = det
        .bbox
        .padded(FACE_CROP_PADDING, frame.width(), frame.height());
    let crop = frame.crop(&padded)?;
    crops.insert(crop_key, crop.clone());
    Ok(crop)
}

/// Re-runs detection on the padded crop of a zero-confidence face and keeps
/// the best probability found there. Stays 0 when recovery finds nothing.
fn recover_probability(
    models: &mut LoadedModels,
    crops: &mut BoundedCache<CropKey, Frame>,
    key: &str,
    idx: usize,
    frame: &Frame,
    det: &Detection,
) -> f64 {
    let crop = match face_crop(crops, key, idx, frame, det) {
        Ok(crop) => crop,
        Err(e) => {
            log::debug!("Probability recovery skipped for face {idx}: {e}");
            return 0.0;
        }
    };
    match models.detector.detect(&crop) {
        Ok(found) => found.iter().map(|d| d.probability).fold(0.0, f64::max),
        Err(e) => {
            log::debug!("Probability recovery failed for face {idx}: {e}");
            0.0
        }
    }
}

fn predict_face(
    models: &mut LoadedModels,
    crops: &mut BoundedCache<CropKey, Frame>,
    key: &str,
    idx: usize,
    frame: &Frame,
    det: &Detection,
) -> Prediction {
    let classified = models.classifier.as_mut().map(|classifier| {
        let result = face_crop(crops, key, idx, frame, det)
            .map_err(|e| e.to_string())
            .and_then(|crop| classifier.classify(&crop).map_err(|e| e.to_string()));
        match result {
            Ok(prediction) => prediction,
            Err(e) => {
                log::warn!("Attribute classification failed for face {idx}: {e}");
                AttributePrediction::default()
            }
        }
    });
    let (attributes, attribute_confidence) = classified.map(|p| (p.attributes, p.confidence)).unzip();

    Prediction {
        top_left: det.bbox.top_left(),
        bottom_right: det.bbox.bottom_right(),
        probability: det.probability,
        attributes,
        attribute_confidence,
        landmarks: det.landmarks.as_ref().map(|lm| lm.to_pairs()),
    }
}
