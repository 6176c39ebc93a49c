use super::*;
use crate::chess::{Color, PieceClass, PieceKind, Square};
use crate::config::ChesscamConfig;
use crate::error::DetectionError;
use crate::frame::FrameData;
use crate::geometry::BoardGeometry;
use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct StaticScorer(RawPrediction);

#[async_trait]
impl Scorer for StaticScorer {
    async fn score(&self, _input: &InputTensor) -> Result<RawPrediction, DetectionError> {
        Ok(self.0.clone())
    }
}

struct FailingScorer;

#[async_trait]
impl Scorer for FailingScorer {
    async fn score(&self, _input: &InputTensor) -> Result<RawPrediction, DetectionError> {
        Err(DetectionError::ScorerFailed {
            details: "model crashed".to_string(),
        })
    }
}

struct SlowScorer;

#[async_trait]
impl Scorer for SlowScorer {
    async fn score(&self, _input: &InputTensor) -> Result<RawPrediction, DetectionError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(RawPrediction::default())
    }
}

fn raw_box(cx: f32, cy: f32, size: f32, piece: PieceClass, score: f32) -> RawBox {
    let mut scores = vec![0.0; PieceClass::COUNT];
    scores[piece.index()] = score;
    RawBox {
        cx,
        cy,
        w: size,
        h: size,
        scores,
    }
}

fn detection(index: usize, cx: f32, cy: f32, size: f32, score: f32) -> Detection {
    Detection {
        index,
        cx,
        cy,
        w: size,
        h: size,
        piece: white_pawn(),
        score,
    }
}

fn white_pawn() -> PieceClass {
    PieceClass::new(Color::White, PieceKind::Pawn)
}

fn black_queen() -> PieceClass {
    PieceClass::new(Color::Black, PieceKind::Queen)
}

fn sq(name: &str) -> Square {
    name.parse().unwrap()
}

/// Pipeline over a square 640x640 input so letterboxing is the identity
fn pipeline_with(scorer: Arc<dyn Scorer>) -> DetectionPipeline {
    let mut config = ChesscamConfig::default().detection;
    config.input_width = 640;
    config.input_height = 640;
    DetectionPipeline::new(config, scorer)
}

#[test]
fn test_letterbox_fit_records_scale_and_padding() {
    let transform = Letterbox::fit(640, 480, 480, 288);

    assert!((transform.scale - 0.6).abs() < 1e-6);
    assert_eq!((transform.resized_width, transform.resized_height), (384, 288));
    assert_eq!((transform.pad_x, transform.pad_y), (48, 0));

    let (x, y) = transform.to_input(100.0, 50.0);
    assert!((x - 108.0).abs() < 1e-4 && (y - 30.0).abs() < 1e-4);
    let (x, y) = transform.to_frame(108.0, 30.0);
    assert!((x - 100.0).abs() < 1e-4 && (y - 50.0).abs() < 1e-4);
}

#[test]
fn test_letterbox_pads_with_grey() {
    let frame = FrameData::blank(1, 200, 100);
    let (tensor, transform) = letterbox(&frame, 100, 100).unwrap();

    assert_eq!((tensor.width, tensor.height), (100, 100));
    assert_eq!(tensor.data.len(), 3 * 100 * 100);
    assert_eq!((transform.pad_x, transform.pad_y), (0, 25));

    // Top-left pixel is padding, the centre pixel is the black frame
    assert!((tensor.data[0] - 114.0 / 255.0).abs() < 1e-6);
    assert_eq!(tensor.data[50 * 100 + 50], 0.0);
}

#[test]
fn test_decode_boxes_filters_and_picks_best_class() {
    let mut mixed = raw_box(10.0, 10.0, 5.0, white_pawn(), 0.3);
    mixed.scores[black_queen().index()] = 0.8;

    let prediction = RawPrediction {
        boxes: vec![mixed, raw_box(50.0, 50.0, 5.0, white_pawn(), 0.4)],
    };

    let detections = decode_boxes(&prediction, 0.5).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].index, 0);
    assert_eq!(detections[0].piece, black_queen());
    assert!((detections[0].score - 0.8).abs() < 1e-6);
}

#[test]
fn test_decode_boxes_rejects_wrong_class_count() {
    let prediction = RawPrediction {
        boxes: vec![RawBox {
            cx: 1.0,
            cy: 1.0,
            w: 1.0,
            h: 1.0,
            scores: vec![0.9; 3],
        }],
    };

    assert!(matches!(
        decode_boxes(&prediction, 0.5),
        Err(DetectionError::MalformedOutput { .. })
    ));
}

#[test]
fn test_nms_keeps_higher_scoring_duplicate() {
    let low = detection(0, 100.0, 100.0, 40.0, 0.6);
    let high = detection(1, 102.0, 101.0, 40.0, 0.9);
    assert!(low.iou(&high) > 0.45);

    let kept = non_max_suppression(vec![low, high], 0.45);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].index, 1);
    assert!((kept[0].score - 0.9).abs() < 1e-6);
}

#[test]
fn test_nms_tie_keeps_first_index() {
    let first = detection(0, 100.0, 100.0, 40.0, 0.8);
    let second = detection(1, 101.0, 100.0, 40.0, 0.8);

    let kept = non_max_suppression(vec![second, first], 0.45);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].index, 0);
}

#[test]
fn test_nms_keeps_separate_pieces() {
    let a = detection(0, 100.0, 100.0, 40.0, 0.7);
    let b = detection(1, 200.0, 100.0, 40.0, 0.9);

    let kept = non_max_suppression(vec![a, b], 0.45);
    let indices: Vec<usize> = kept.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![1, 0]);
}

#[test]
fn test_iou_of_empty_boxes_is_zero() {
    let a = detection(0, 10.0, 10.0, 0.0, 0.9);
    let b = detection(1, 10.0, 10.0, 0.0, 0.9);
    assert_eq!(a.iou(&b), 0.0);
}

#[test]
fn test_map_to_squares_enforces_exclusivity() {
    let geometry = BoardGeometry::axis_aligned(800, 800).unwrap();
    let transform = Letterbox::fit(800, 800, 800, 800);

    // Two different pieces on e2 (centre 450, 650), plus one off-board box
    let mut weak = detection(0, 440.0, 640.0, 10.0, 0.55);
    weak.piece = black_queen();
    let strong = detection(1, 460.0, 660.0, 10.0, 0.95);
    let off_board = detection(2, 900.0, 100.0, 10.0, 0.99);

    let observations = map_to_squares(&[weak, strong, off_board], &transform, &geometry);
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].square, sq("e2"));
    assert_eq!(observations[0].piece, white_pawn());
}

#[test]
fn test_map_to_squares_keeps_most_confident_32() {
    let geometry = BoardGeometry::axis_aligned(800, 800).unwrap();
    let transform = Letterbox::fit(800, 800, 800, 800);

    // One box on each of the first 40 squares, confidence rising with the index
    let detections: Vec<Detection> = Square::all()
        .take(40)
        .enumerate()
        .map(|(i, square)| {
            let cx = square.file() as f32 * 100.0 + 50.0;
            let cy = (7 - square.rank()) as f32 * 100.0 + 50.0;
            detection(i, cx, cy, 40.0, 0.5 + i as f32 * 0.01)
        })
        .collect();

    let observations = map_to_squares(&detections, &transform, &geometry);
    assert_eq!(observations.len(), 32);

    // a1..h1 held the eight weakest boxes
    let kept: Vec<Square> = observations.iter().map(|obs| obs.square).collect();
    let expected: Vec<Square> = Square::all().skip(8).take(32).collect();
    assert_eq!(kept, expected);
    assert!(observations.iter().all(|obs| obs.confidence >= 0.58 - 1e-6));
}

#[tokio::test]
async fn test_detect_produces_deduplicated_snapshot() {
    // 640px board: each square is 80px; e2 centre is (360, 520), e7 centre is (360, 120)
    let prediction = RawPrediction {
        boxes: vec![
            raw_box(360.0, 520.0, 60.0, white_pawn(), 0.6),
            raw_box(362.0, 522.0, 60.0, white_pawn(), 0.9),
            raw_box(360.0, 120.0, 60.0, black_queen(), 0.8),
            raw_box(100.0, 100.0, 60.0, white_pawn(), 0.2),
        ],
    };
    let pipeline = pipeline_with(Arc::new(StaticScorer(prediction)));
    let geometry = BoardGeometry::axis_aligned(640, 640).unwrap();
    let frame = FrameData::blank(7, 640, 640);

    let observations = pipeline.detect(&frame, &geometry).await.unwrap();
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].square, sq("e2"));
    assert!((observations[0].confidence - 0.9).abs() < 1e-6);
    assert_eq!(observations[1].square, sq("e7"));

    let snapshot = pipeline.snapshot(&frame, &geometry).await.unwrap();
    assert_eq!(snapshot.get(sq("e2")), Some(white_pawn()));
    assert_eq!(snapshot.get(sq("e7")), Some(black_queen()));
    assert_eq!(snapshot.len(), 2);

    // Identical input and scorer output give an identical snapshot
    assert_eq!(pipeline.snapshot(&frame, &geometry).await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_detect_maps_through_letterbox() {
    // 1280x640 frame into a 640x640 input: scale 0.5, pad_y 160.
    // Board occupies the left half of the frame (0..640).
    let prediction = RawPrediction {
        boxes: vec![raw_box(180.0, 420.0, 30.0, white_pawn(), 0.9)],
    };
    let pipeline = pipeline_with(Arc::new(StaticScorer(prediction)));
    let geometry =
        BoardGeometry::from_corners([[0.0, 0.0], [640.0, 0.0], [640.0, 640.0], [0.0, 640.0]])
            .unwrap();
    let frame = FrameData::blank(1, 1280, 640);

    // Input (180, 420) -> frame (360, 520) -> e2
    let observations = pipeline.detect(&frame, &geometry).await.unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].square, sq("e2"));
}

#[tokio::test]
async fn test_detect_surfaces_scorer_failure() {
    let pipeline = pipeline_with(Arc::new(FailingScorer));
    let geometry = BoardGeometry::axis_aligned(64, 64).unwrap();

    let result = pipeline.detect(&FrameData::blank(1, 64, 64), &geometry).await;
    assert!(matches!(result, Err(DetectionError::ScorerFailed { .. })));
}

#[tokio::test]
async fn test_detect_times_out_slow_scorer() {
    let mut config = pipeline_with(Arc::new(SlowScorer)).config().clone();
    config.inference_timeout_ms = 50;
    let pipeline = DetectionPipeline::new(config, Arc::new(SlowScorer));
    let geometry = BoardGeometry::axis_aligned(64, 64).unwrap();

    let result = pipeline.detect(&FrameData::blank(1, 64, 64), &geometry).await;
    assert_eq!(result, Err(DetectionError::ScorerTimeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn test_detect_rejects_malformed_frame() {
    let pipeline = pipeline_with(Arc::new(StaticScorer(RawPrediction::default())));
    let geometry = BoardGeometry::axis_aligned(64, 64).unwrap();
    let mut frame = FrameData::blank(1, 64, 64);
    frame.width = 65;

    let result = pipeline.detect(&frame, &geometry).await;
    assert!(matches!(result, Err(DetectionError::MalformedFrame { .. })));
}

fn arb_detections() -> impl Strategy<Value = Vec<Detection>> {
    prop::collection::vec(
        (0.0f32..800.0, 0.0f32..800.0, 10.0f32..120.0, 0.0f32..1.0, 0usize..12),
        0..40,
    )
    .prop_map(|boxes| {
        boxes
            .into_iter()
            .enumerate()
            .map(|(index, (cx, cy, size, score, class))| Detection {
                index,
                cx,
                cy,
                w: size,
                h: size,
                piece: PieceClass::from_index(class).unwrap(),
                score,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_nms_survivors_do_not_overlap(detections in arb_detections(), threshold in 0.1f32..0.9) {
        let kept = non_max_suppression(detections.clone(), threshold);

        for (i, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(i + 1) {
                prop_assert!(a.iou(b) <= threshold);
            }
        }

        if let Some(best) = detections.iter().map(|d| d.score).reduce(f32::max) {
            prop_assert_eq!(kept[0].score, best);
        }
    }

    #[test]
    fn prop_snapshot_squares_are_exclusive(detections in arb_detections()) {
        let geometry = BoardGeometry::axis_aligned(800, 800).unwrap();
        let transform = Letterbox::fit(800, 800, 800, 800);
        let survivors = non_max_suppression(detections, 0.45);

        let observations = map_to_squares(&survivors, &transform, &geometry);
        prop_assert!(observations.len() <= 32);
        for pair in observations.windows(2) {
            prop_assert!(pair[0].square < pair[1].square);
        }

        // Every observation is the best surviving detection mapped to its square
        for obs in &observations {
            let best = survivors
                .iter()
                .filter(|d| {
                    let (x, y) = transform.to_frame(d.cx, d.cy);
                    geometry.square_at(x, y) == Some(obs.square)
                })
                .map(|d| d.score)
                .fold(f32::MIN, f32::max);
            prop_assert_eq!(obs.confidence, best);
        }
    }
}
