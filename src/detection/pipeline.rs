use super::preprocess::{letterbox, Letterbox};
use super::scorer::Scorer;
use super::suppression::{decode_boxes, non_max_suppression, Detection};
use crate::chess::{PieceClass, Snapshot, Square, MAX_PIECES};
use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::frame::FrameData;
use crate::geometry::BoardGeometry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A piece the pipeline believes occupies a square
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PieceObservation {
    pub square: Square,
    pub piece: PieceClass,
    pub confidence: f32,
}

/// Frame to occupancy: letterbox, score, filter, suppress, map to squares
pub struct DetectionPipeline {
    config: DetectionConfig,
    scorer: Arc<dyn Scorer>,
}

impl DetectionPipeline {
    pub fn new(config: DetectionConfig, scorer: Arc<dyn Scorer>) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Observations for one frame, ordered by square. Any error means the
    /// frame should be skipped.
    pub async fn detect(
        &self,
        frame: &FrameData,
        geometry: &BoardGeometry,
    ) -> Result<Vec<PieceObservation>, DetectionError> {
        let (input_width, input_height) = (self.config.input_width, self.config.input_height);
        let owned = frame.clone();
        let (tensor, transform) =
            tokio::task::spawn_blocking(move || letterbox(&owned, input_width, input_height))
                .await
                .map_err(|e| DetectionError::MalformedFrame {
                    details: format!("preprocessing task failed: {}", e),
                })??;

        let timeout = Duration::from_millis(self.config.inference_timeout_ms);
        let prediction = tokio::time::timeout(timeout, self.scorer.score(&tensor))
            .await
            .map_err(|_| DetectionError::ScorerTimeout {
                timeout_ms: self.config.inference_timeout_ms,
            })??;

        let candidates = decode_boxes(&prediction, self.config.confidence_threshold)?;
        let raw_count = prediction.boxes.len();
        let scored = candidates.len();
        let survivors = non_max_suppression(candidates, self.config.iou_threshold);

        debug!(
            "Frame {}: {} raw boxes, {} above threshold, {} after suppression ({})",
            frame.id,
            raw_count,
            scored,
            survivors.len(),
            self.scorer.name()
        );

        Ok(map_to_squares(&survivors, &transform, geometry))
    }

    /// Occupancy snapshot for one frame
    pub async fn snapshot(
        &self,
        frame: &FrameData,
        geometry: &BoardGeometry,
    ) -> Result<Snapshot, DetectionError> {
        let observations = self.detect(frame, geometry).await?;
        Ok(observations
            .iter()
            .map(|obs| (obs.square, obs.piece))
            .collect())
    }
}

/// Map suppressed detections onto squares.
///
/// Centres go back through the letterbox and then through the board geometry.
/// Off-board centres are dropped. When two detections land on one square the
/// higher confidence wins, the earlier one on a tie. At most 32 observations
/// are kept, highest confidence first.
pub fn map_to_squares(
    detections: &[Detection],
    transform: &Letterbox,
    geometry: &BoardGeometry,
) -> Vec<PieceObservation> {
    let mut by_square: BTreeMap<Square, PieceObservation> = BTreeMap::new();

    for detection in detections {
        let (x, y) = transform.to_frame(detection.cx, detection.cy);
        let Some(square) = geometry.square_at(x, y) else {
            trace!(
                "Discarding box {} ({}) at frame ({:.1}, {:.1}): off board",
                detection.index,
                detection.piece,
                x,
                y
            );
            continue;
        };

        let observation = PieceObservation {
            square,
            piece: detection.piece,
            confidence: detection.score,
        };

        match by_square.get(&square) {
            Some(existing) if existing.confidence >= observation.confidence => {
                trace!(
                    "Square {} already holds {} ({:.2}), dropping {} ({:.2})",
                    square,
                    existing.piece,
                    existing.confidence,
                    observation.piece,
                    observation.confidence
                );
            }
            _ => {
                by_square.insert(square, observation);
            }
        }
    }

    let mut observations: Vec<PieceObservation> = by_square.into_values().collect();
    if observations.len() > MAX_PIECES {
        observations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        observations.truncate(MAX_PIECES);
        observations.sort_by_key(|obs| obs.square);
    }
    observations
}
