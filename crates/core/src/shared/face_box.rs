/// Axis-aligned face bounding box in pixel coordinates (`x1,y1` top-left).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl FaceBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn top_left(&self) -> [f64; 2] {
        [self.x1, self.y1]
    }

    pub fn bottom_right(&self) -> [f64; 2] {
        [self.x2, self.y2]
    }

    pub fn iou(&self, other: &FaceBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Grows the box by `fraction` of its size on every side, clamped to
    /// `[0, frame_w] x [0, frame_h]`.
    pub fn padded(&self, fraction: f64, frame_w: u32, frame_h: u32) -> FaceBox {
        let pad_x = self.width() * fraction;
        let pad_y = self.height() * fraction;
        FaceBox {
            x1: (self.x1 - pad_x).max(0.0),
            y1: (self.y1 - pad_y).max(0.0),
            x2: (self.x2 + pad_x).min(frame_w as f64),
            y2: (self.y2 + pad_y).min(frame_h as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_iou_identical() {
        let a = FaceBox::new(10.0, 10.0, 110.0, 110.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = FaceBox::new(0.0, 0.0, 50.0, 50.0);
        let b = FaceBox::new(100.0, 100.0, 150.0, 150.0);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = FaceBox::new(0.0, 0.0, 100.0, 100.0);
        let b = FaceBox::new(50.0, 0.0, 150.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = FaceBox::new(0.0, 0.0, 50.0, 50.0);
        let b = FaceBox::new(50.0, 0.0, 100.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[rstest]
    #[case::zero_width(FaceBox::new(0.0, 0.0, 0.0, 100.0))]
    #[case::inverted(FaceBox::new(10.0, 10.0, 5.0, 5.0))]
    fn test_degenerate_box_has_no_area(#[case] b: FaceBox) {
        assert_relative_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_padded_grows_symmetrically() {
        let b = FaceBox::new(100.0, 100.0, 200.0, 150.0);
        let p = b.padded(0.2, 1000, 1000);
        assert_relative_eq!(p.x1, 80.0);
        assert_relative_eq!(p.y1, 90.0);
        assert_relative_eq!(p.x2, 220.0);
        assert_relative_eq!(p.y2, 160.0);
    }

    #[test]
    fn test_padded_clamps_to_frame() {
        let b = FaceBox::new(0.0, 5.0, 100.0, 95.0);
        let p = b.padded(0.5, 120, 100);
        assert_relative_eq!(p.x1, 0.0);
        assert_relative_eq!(p.y1, 0.0);
        assert_relative_eq!(p.x2, 120.0);
        assert_relative_eq!(p.y2, 100.0);
    }

    #[test]
    fn test_corner_accessors() {
        let b = FaceBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(b.top_left(), [1.0, 2.0]);
        assert_eq!(b.bottom_right(), [3.0, 4.0]);
    }
}
