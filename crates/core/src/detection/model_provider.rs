//! Explicit lifecycle for the per-worker model set.

use thiserror::Error;

use crate::detection::domain::attribute_classifier::AttributeClassifier;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::feature_extractor::FeatureExtractor;

#[derive(Error, Debug)]
pub enum ModelProviderError {
    #[error("models accessed before initialize()")]
    NotInitialized,
    #[error("failed to load models: {0}")]
    Load(String),
}

/// The capabilities one worker needs to embed images.
pub struct LoadedModels {
    pub detector: Box<dyn FaceDetector>,
    pub extractor: Box<dyn FeatureExtractor>,
    /// `None` when no attribute model is installed.
    pub classifier: Option<Box<dyn AttributeClassifier>>,
}

/// Builds a fresh model set. Called once per `initialize()`.
pub trait ModelLoader: Send {
    fn load(&self) -> Result<LoadedModels, Box<dyn std::error::Error>>;
}

/// Owns a worker's models between `initialize()` and `dispose()`.
pub struct ModelProvider {
    loader: Box<dyn ModelLoader>,
    models: Option<LoadedModels>,
}

impl ModelProvider {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: None,
        }
    }

    /// Loads the models. A second call while initialized is a no-op.
    pub fn initialize(&mut self) -> Result<(), ModelProviderError> {
        if self.models.is_some() {
            return Ok(());
        }
        let models = self
            .loader
            .load()
            .map_err(|e| ModelProviderError::Load(e.to_string()))?;
        log::debug!(
            "Models initialized (attribute classifier: {})",
            if models.classifier.is_some() { "yes" } else { "no" }
        );
        self.models = Some(models);
        Ok(())
    }

    /// Drops every model handle. `initialize()` may be called again later.
    pub fn dispose(&mut self) {
        if self.models.take().is_some() {
            log::debug!("Models disposed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.models.is_some()
    }

    pub fn models_mut(&mut self) -> Result<&mut LoadedModels, ModelProviderError> {
        self.models.as_mut().ok_or(ModelProviderError::NotInitialized)
    }
}
