//! 5-point face landmarks and the alignment quality derived from them.
//!
//! Point order: left eye, right eye, nose, left mouth corner, right mouth corner.

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    /// Builds landmarks from serialized `[x, y]` pairs. Requires exactly five.
    pub fn from_pairs(pairs: &[[f64; 2]]) -> Option<Self> {
        if pairs.len() != 5 {
            return None;
        }
        let mut points = [(0.0, 0.0); 5];
        for (dst, src) in points.iter_mut().zip(pairs) {
            *dst = (src[0], src[1]);
        }
        Some(Self { points })
    }

    pub fn to_pairs(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|&(x, y)| [x, y]).collect()
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn has_visible(&self) -> bool {
        self.points.iter().any(|(x, _)| *x > 0.0)
    }

    /// How much the face is turned: 0.0 = frontal, 1.0 = full profile.
    ///
    /// Measures nose offset from eye midpoint relative to eye span.
    /// Returns 0.0 when required landmarks are not visible.
    pub fn profile_ratio(&self) -> f64 {
        let nose = self.points[NOSE];
        let left_eye = self.points[LEFT_EYE];
        let right_eye = self.points[RIGHT_EYE];

        if nose.0 <= 0.0 || left_eye.0 <= 0.0 || right_eye.0 <= 0.0 {
            return 0.0;
        }

        let eye_mid_x = (left_eye.0 + right_eye.0) / 2.0;
        let eye_span = (right_eye.0 - left_eye.0).abs();

        if eye_span <= 0.0 {
            return 0.0;
        }

        ((nose.0 - eye_mid_x).abs() / eye_span).min(1.0)
    }

    /// In-plane head tilt in radians: the angle of the eye line against the
    /// horizontal. `None` when either eye is invisible.
    pub fn eye_roll(&self) -> Option<f64> {
        let (lx, ly) = self.points[LEFT_EYE];
        let (rx, ry) = self.points[RIGHT_EYE];
        if lx <= 0.0 || rx <= 0.0 {
            return None;
        }
        Some((ry - ly).atan2(rx - lx))
    }

    /// Alignment quality in `[0, 1]`: 1.0 for an upright frontal face,
    /// falling with yaw (profile ratio) and roll (eye-line tilt).
    ///
    /// Returns 0.0 when the eyes or nose are not visible.
    pub fn alignment_score(&self) -> f64 {
        if self.points[NOSE].0 <= 0.0 {
            return 0.0;
        }
        match self.eye_roll() {
            Some(roll) => (1.0 - self.profile_ratio()) * roll.cos().max(0.0),
            None => 0.0,
        }
    }
}
