//! Attribute classifier backed by up to four single-head ONNX models.
//!
//! Each head is optional. A head whose model is absent reports `Unknown`
//! at neutral confidence, so a partially installed model set still works.
use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::attribute_classifier::{AttributeClassifier, AttributePrediction};
use crate::detection::domain::face_attributes::{
    AgeGroup, Category, Gender, HairColor, SkinTone, NEUTRAL_CONFIDENCE,
};
use crate::detection::infrastructure::execution_provider::build_session;
use crate::detection::infrastructure::math;
use crate::shared::constants::{
    AGE_GROUP_MODEL_NAME, GENDER_MODEL_NAME, HAIR_COLOR_MODEL_NAME, SKIN_TONE_MODEL_NAME,
};
use crate::shared::frame::Frame;
use crate::shared::model_resolver;

const INPUT_SIZE: usize = 224;

struct Head {
    session: ort::session::Session,
}

impl Head {
    fn load(dir: &Path, name: &str) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        match model_resolver::find_local(name, [Some(dir)]) {
            Some(path) => {
                log::debug!("Loading attribute head {}", path.display());
                Ok(Some(Self {
                    session: build_session(&path)?,
                }))
            }
            None => {
                log::debug!("Attribute head {name} not installed");
                Ok(None)
            }
        }
    }

    fn predict<C: Category>(&mut self, input: Array4<f32>) -> Result<(C, f64), Box<dyn std::error::Error>> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let logits = outputs[0].try_extract_array::<f32>()?;
        let logits = logits.as_slice().ok_or("Cannot get logits slice")?;
        Ok(pick(&math::softmax(logits)))
    }
}

/// Most probable category. Indices outside the known labels map to `Unknown`
/// at neutral confidence.
fn pick<C: Category>(probs: &[f64]) -> (C, f64) {
    match math::argmax(probs) {
        Some((idx, p)) if idx < C::LABELS.len() => (C::from_index(idx), p),
        _ => (C::default(), NEUTRAL_CONFIDENCE),
    }
}

fn run_head<C: Category>(
    head: &mut Option<Head>,
    input: &Array4<f32>,
) -> Result<(C, f64), Box<dyn std::error::Error>> {
    match head {
        Some(head) => head.predict(input.clone()),
        None => Ok((C::default(), NEUTRAL_CONFIDENCE)),
    }
}

pub struct OnnxAttributeClassifier {
    gender: Option<Head>,
    hair_color: Option<Head>,
    age_group: Option<Head>,
    skin_tone: Option<Head>,
}

impl OnnxAttributeClassifier {
    /// Loads whichever heads are present in `model_dir`. Returns `None`
    /// when no head is installed at all.
    pub fn from_dir(model_dir: &Path) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        let classifier = Self {
            gender: Head::load(model_dir, GENDER_MODEL_NAME)?,
            hair_color: Head::load(model_dir, HAIR_COLOR_MODEL_NAME)?,
            age_group: Head::load(model_dir, AGE_GROUP_MODEL_NAME)?,
            skin_tone: Head::load(model_dir, SKIN_TONE_MODEL_NAME)?,
        };
        let any = classifier.gender.is_some()
            || classifier.hair_color.is_some()
            || classifier.age_group.is_some()
            || classifier.skin_tone.is_some();
        Ok(any.then_some(classifier))
    }
}

impl AttributeClassifier for OnnxAttributeClassifier {
    fn classify(&mut self, face: &Frame) -> Result<AttributePrediction, Box<dyn std::error::Error>> {
        let input = preprocess(face);
        let (gender, gender_conf) = run_head::<Gender>(&mut self.gender, &input)?;
        let (hair_color, hair_conf) = run_head::<HairColor>(&mut self.hair_color, &input)?;
        let (age_group, age_conf) = run_head::<AgeGroup>(&mut self.age_group, &input)?;
        let (skin_tone, skin_conf) = run_head::<SkinTone>(&mut self.skin_tone, &input)?;

        let mut prediction = AttributePrediction::default();
        prediction.attributes.gender = gender;
        prediction.attributes.hair_color = hair_color;
        prediction.attributes.age_group = age_group;
        prediction.attributes.skin_tone = skin_tone;
        prediction.confidence.gender = gender_conf;
        prediction.confidence.hair_color = hair_conf;
        prediction.confidence.age_group = age_conf;
        prediction.confidence.skin_tone = skin_conf;
        Ok(prediction)
    }
}

/// Nearest-neighbour resize to 224x224, scaled to `[0, 1]`, NCHW layout.
fn preprocess(face: &Frame) -> Array4<f32> {
    let src = face.as_ndarray();
    let src_w = face.width() as usize;
    let src_h = face.height() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}
