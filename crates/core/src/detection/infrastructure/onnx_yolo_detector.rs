/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, keypoint decoding and NMS
/// post-processing. Boxes are returned in source-frame pixel coordinates.
use std::path::Path;

use crate::detection::domain::face_detector::{Detection, FaceDetector};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::infrastructure::execution_provider::build_session;
use crate::detection::infrastructure::math;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Number of keypoints per detection (5 landmarks × 3 values each: x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    /// Runs the network and returns the raw output rows, one per candidate.
    ///
    /// The input tensor and the session outputs are dropped when this
    /// returns, on success and on error alike.
    fn infer_rows(&mut self, input: ndarray::Array4<f32>) -> Result<Vec<Vec<f32>>, Box<dyn std::error::Error>> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape();

        // YOLO output is [1, features, detections] (transposed) or
        // [1, detections, features]. Handle both.
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let rows = (0..num_dets)
            .map(|i| {
                if transposed {
                    (0..num_feats).map(|f| data[f * num_dets + i]).collect()
                } else {
                    data[i * num_feats..(i + 1) * num_feats].to_vec()
                }
            })
            .collect();
        Ok(rows)
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let (input, transform) = letterbox(frame, self.input_size);
        let rows = self.infer_rows(input)?;

        let detections = rows
            .iter()
            .filter_map(|row| decode_row(row, self.confidence, &transform, frame))
            .collect();

        Ok(math::nms(detections, NMS_IOU_THRESH))
    }
}

/// Maps letterboxed model coordinates back to source-frame pixels.
#[derive(Clone, Copy, Debug)]
struct LetterboxTransform {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl LetterboxTransform {
    fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Row format: `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn decode_row(
    row: &[f32],
    min_confidence: f64,
    transform: &LetterboxTransform,
    frame: &Frame,
) -> Option<Detection> {
    if row.len() < 5 {
        return None;
    }
    let conf = row[4] as f64;
    if conf < min_confidence {
        return None;
    }

    let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
    let (x1, y1) = transform.to_source(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = transform.to_source(cx + w / 2.0, cy + h / 2.0);
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let bbox = FaceBox::new(x1.max(0.0), y1.max(0.0), x2.min(fw), y2.min(fh));
    if bbox.area() <= 0.0 {
        return None;
    }

    let landmarks = if row.len() >= 5 + NUM_KEYPOINT_VALUES {
        let mut pts = [(0.0f64, 0.0f64); 5];
        for (k, pt) in pts.iter_mut().enumerate() {
            let kconf = row[5 + k * 3 + 2] as f64;
            if kconf >= KEYPOINT_CONF_THRESH {
                *pt = transform.to_source(row[5 + k * 3] as f64, row[5 + k * 3 + 1] as f64);
            }
            // else: stays (0.0, 0.0), treated as invisible by FaceLandmarks
        }
        Some(FaceLandmarks::new(pts))
    } else {
        None
    };

    Some(Detection {
        bbox,
        probability: conf.min(1.0),
        landmarks,
    })
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns the NCHW float32 tensor and the transform back to frame coordinates.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, LetterboxTransform) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).clamp(1, target_size);
    let new_h = ((fh * scale).round() as u32).clamp(1, target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded area is 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        LetterboxTransform {
            scale,
            pad_x,
            pad_y,
        },
    )
}
