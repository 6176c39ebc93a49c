use crate::detection::Scorer;
use crate::error::{BoardError, DetectionError};
use crate::frame::FrameData;
use async_trait::async_trait;
use std::sync::Arc;

/// Where a board's frames come from
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Next frame, or `None` once the source is exhausted. An error skips one
    /// frame; the worker keeps pulling.
    async fn next_frame(&mut self) -> Result<Option<FrameData>, DetectionError>;

    /// Short name for logs
    fn name(&self) -> String {
        "frames".to_string()
    }
}

/// Everything one board's worker needs from the outside world
pub struct BoardFeed {
    pub frames: Box<dyn FrameSource>,
    pub scorer: Arc<dyn Scorer>,
}

/// Provisions one capture device per board
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Exactly `count` feeds, in board-id order, or
    /// `BoardError::CameraUnavailable` when fewer devices can be provided
    async fn provision(&self, count: usize) -> Result<Vec<BoardFeed>, BoardError>;

    /// Devices currently available
    async fn available(&self) -> usize;
}

/// Provider for hosts without capture hardware: every request larger than
/// zero boards fails
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCameraProvider;

#[async_trait]
impl CameraProvider for UnavailableCameraProvider {
    async fn provision(&self, count: usize) -> Result<Vec<BoardFeed>, BoardError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        Err(BoardError::CameraUnavailable {
            requested: count,
            available: 0,
        })
    }

    async fn available(&self) -> usize {
        0
    }
}
