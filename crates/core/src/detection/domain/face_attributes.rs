//! Coarse categorical face attributes and the weighted agreement score used
//! to bias clustering alongside embedding similarity.

use serde::{Deserialize, Serialize};

/// Confidence assigned to attributes that could not be classified.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

const GENDER_WEIGHT: f64 = 0.4;
const HAIR_COLOR_WEIGHT: f64 = 0.3;
const AGE_GROUP_WEIGHT: f64 = 0.2;
const SKIN_TONE_WEIGHT: f64 = 0.1;
const TOTAL_WEIGHT: f64 = GENDER_WEIGHT + HAIR_COLOR_WEIGHT + AGE_GROUP_WEIGHT + SKIN_TONE_WEIGHT;

/// A classifier output category. `LABELS` lists the known values in the
/// order a classifier head emits its logits.
pub trait Category: Copy + Default + PartialEq + 'static {
    const LABELS: &'static [Self];

    fn from_index(index: usize) -> Self {
        Self::LABELS.get(index).copied().unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Category for Gender {
    const LABELS: &'static [Self] = &[Gender::Male, Gender::Female];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HairColor {
    Black,
    Brown,
    Blonde,
    Red,
    Gray,
    White,
    #[default]
    Unknown,
}

impl Category for HairColor {
    const LABELS: &'static [Self] = &[
        HairColor::Black,
        HairColor::Brown,
        HairColor::Blonde,
        HairColor::Red,
        HairColor::Gray,
        HairColor::White,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    YoungAdult,
    Adult,
    Senior,
    #[default]
    Unknown,
}

impl Category for AgeGroup {
    const LABELS: &'static [Self] = &[
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::YoungAdult,
        AgeGroup::Adult,
        AgeGroup::Senior,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinTone {
    Light,
    Medium,
    Tan,
    Dark,
    #[default]
    Unknown,
}

impl Category for SkinTone {
    const LABELS: &'static [Self] = &[
        SkinTone::Light,
        SkinTone::Medium,
        SkinTone::Tan,
        SkinTone::Dark,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAttributes {
    pub gender: Gender,
    pub hair_color: HairColor,
    pub age_group: AgeGroup,
    pub skin_tone: SkinTone,
}

/// Per-category confidence, parallel to [`FaceAttributes`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfidence {
    pub gender: f64,
    pub hair_color: f64,
    pub age_group: f64,
    pub skin_tone: f64,
}

impl Default for AttributeConfidence {
    fn default() -> Self {
        Self {
            gender: NEUTRAL_CONFIDENCE,
            hair_color: NEUTRAL_CONFIDENCE,
            age_group: NEUTRAL_CONFIDENCE,
            skin_tone: NEUTRAL_CONFIDENCE,
        }
    }
}

/// Weighted categorical agreement in `[0, 1]`.
///
/// Each matching category contributes `weight * min(conf_a, conf_b)`. Two
/// unclassified faces agree on every category at neutral confidence, so they
/// score 0.5 rather than 0.
pub fn attribute_match(
    a: &FaceAttributes,
    a_conf: &AttributeConfidence,
    b: &FaceAttributes,
    b_conf: &AttributeConfidence,
) -> f64 {
    let mut score = 0.0;
    if a.gender == b.gender {
        score += GENDER_WEIGHT * a_conf.gender.min(b_conf.gender);
    }
    if a.hair_color == b.hair_color {
        score += HAIR_COLOR_WEIGHT * a_conf.hair_color.min(b_conf.hair_color);
    }
    if a.age_group == b.age_group {
        score += AGE_GROUP_WEIGHT * a_conf.age_group.min(b_conf.age_group);
    }
    if a.skin_tone == b.skin_tone {
        score += SKIN_TONE_WEIGHT * a_conf.skin_tone.min(b_conf.skin_tone);
    }
    (score / TOTAL_WEIGHT).clamp(0.0, 1.0)
}
