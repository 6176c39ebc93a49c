use crate::error::DetectionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Model input: a CHW float tensor with values in `[0, 1]`
#[derive(Debug, Clone)]
pub struct InputTensor {
    pub width: u32,
    pub height: u32,
    /// Channel-major RGB planes, `3 * width * height` values
    pub data: Vec<f32>,
}

/// One raw candidate box in input-tensor pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    /// Per-class scores, indexed like `PieceClass::from_index`
    pub scores: Vec<f32>,
}

/// Everything the scorer returns for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub boxes: Vec<RawBox>,
}

/// Opaque piece-detection model. Implementations may block on inference;
/// callers bound every call with a timeout.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, input: &InputTensor) -> Result<RawPrediction, DetectionError>;

    /// Short name for logs
    fn name(&self) -> &str {
        "scorer"
    }
}
