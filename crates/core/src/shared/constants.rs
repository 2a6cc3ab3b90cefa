pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Attribute head model files, looked up in the configured attribute model directory.
pub const GENDER_MODEL_NAME: &str = "gender.onnx";
pub const HAIR_COLOR_MODEL_NAME: &str = "hair_color.onnx";
pub const AGE_GROUP_MODEL_NAME: &str = "age_group.onnx";
pub const SKIN_TONE_MODEL_NAME: &str = "skin_tone.onnx";

pub const CACHE_DIR_NAME: &str = ".face-cache";
pub const INDEX_FILE_NAME: &str = "index.json";

/// Frames produced by the extraction tooling follow this naming convention.
pub const FRAME_GLOB: &str = "frame-blank*.{jpg,png,webp}";

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_WORKER_FRACTION: f64 = 0.75;

/// Padding added around a detected face before cropping, as a fraction of box size.
pub const FACE_CROP_PADDING: f64 = 0.2;

pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_RESULT_CACHE_TTL_SECS: u64 = 600;
