use super::scorer::RawPrediction;
use crate::chess::PieceClass;
use crate::error::DetectionError;

/// A scored candidate box after class decoding, still in input-tensor pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Position in the scorer's output, used as the stable tie-break
    pub index: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub piece: PieceClass,
    pub score: f32,
}

impl Detection {
    fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }

    fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union with `other`; zero when either box is empty
    pub fn iou(&self, other: &Detection) -> f32 {
        let (ax1, ay1, ax2, ay2) = self.bounds();
        let (bx1, by1, bx2, by2) = other.bounds();

        let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let intersection = iw * ih;
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Decode each raw box to its best class and keep those scoring at least `threshold`
pub fn decode_boxes(
    prediction: &RawPrediction,
    threshold: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let mut detections = Vec::with_capacity(prediction.boxes.len());

    for (index, raw) in prediction.boxes.iter().enumerate() {
        if raw.scores.len() != PieceClass::COUNT {
            return Err(DetectionError::MalformedOutput {
                details: format!(
                    "box {} has {} class scores, expected {}",
                    index,
                    raw.scores.len(),
                    PieceClass::COUNT
                ),
            });
        }

        let mut best = 0;
        for (class, score) in raw.scores.iter().enumerate() {
            if *score > raw.scores[best] {
                best = class;
            }
        }
        let score = raw.scores[best];

        if score >= threshold {
            if let Some(piece) = PieceClass::from_index(best) {
                detections.push(Detection {
                    index,
                    cx: raw.cx,
                    cy: raw.cy,
                    w: raw.w,
                    h: raw.h,
                    piece,
                    score,
                });
            }
        }
    }

    Ok(detections)
}

/// Greedy class-agnostic non-max suppression.
///
/// Boxes are visited by descending score, ties in original index order. A box
/// is dropped when its IoU with an already kept box exceeds `iou_threshold`.
/// The result is in visiting order.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.index.cmp(&b.index))
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept
            .iter()
            .all(|winner| winner.iou(&candidate) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
