pub mod attribute_classifier;
pub mod face_attributes;
pub mod face_detector;
pub mod face_landmarks;
pub mod feature_extractor;
