pub mod execution_provider;
pub mod math;
pub mod onnx_arcface_extractor;
pub mod onnx_attribute_classifier;
pub mod onnx_model_loader;
pub mod onnx_yolo_detector;
