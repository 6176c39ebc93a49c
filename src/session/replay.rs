//! Recorded-detection playback, used in place of cameras and a model.
//!
//! Each board reads `board-<id>.jsonl` from the replay directory. Every line is
//! one frame's scorer output, `{"boxes":[{"cx":..,"cy":..,"w":..,"h":..,"scores":[..]}]}`,
//! in input-tensor pixels. Frames are blank images sized to the model input so
//! box coordinates map straight onto the board.

use super::camera::{BoardFeed, CameraProvider, FrameSource};
use crate::detection::{InputTensor, RawPrediction, Scorer};
use crate::error::{BoardError, DetectionError};
use crate::frame::FrameData;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recorded output for the frame currently being scored
type Slot = Arc<Mutex<Option<RawPrediction>>>;

pub struct ReplayCameraProvider {
    dir: PathBuf,
    frame_width: u32,
    frame_height: u32,
}

impl ReplayCameraProvider {
    pub fn new(dir: impl Into<PathBuf>, frame_width: u32, frame_height: u32) -> Self {
        Self {
            dir: dir.into(),
            frame_width,
            frame_height,
        }
    }

    pub fn recording_path(dir: &Path, board_id: usize) -> PathBuf {
        dir.join(format!("board-{}.jsonl", board_id))
    }
}

#[async_trait]
impl CameraProvider for ReplayCameraProvider {
    async fn provision(&self, count: usize) -> Result<Vec<BoardFeed>, BoardError> {
        let available = self.available().await;
        if available < count {
            warn!(
                "Replay directory {} has recordings for {} boards, {} requested",
                self.dir.display(),
                available,
                count
            );
            return Err(BoardError::CameraUnavailable {
                requested: count,
                available,
            });
        }

        let mut feeds = Vec::with_capacity(count);
        for board_id in 1..=count {
            let path = Self::recording_path(&self.dir, board_id);
            let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                warn!("Cannot read {}: {}", path.display(), e);
                BoardError::CameraUnavailable {
                    requested: count,
                    available: board_id - 1,
                }
            })?;

            let lines: VecDeque<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            info!(
                "Board {} replays {} recorded frames from {}",
                board_id,
                lines.len(),
                path.display()
            );

            let slot: Slot = Arc::new(Mutex::new(None));
            feeds.push(BoardFeed {
                frames: Box::new(ReplayFrameSource {
                    name: format!("replay:{}", path.display()),
                    lines,
                    slot: Arc::clone(&slot),
                    next_id: 1,
                    width: self.frame_width,
                    height: self.frame_height,
                }),
                scorer: Arc::new(ReplayScorer { slot }),
            });
        }

        Ok(feeds)
    }

    async fn available(&self) -> usize {
        let mut count = 0;
        while tokio::fs::try_exists(Self::recording_path(&self.dir, count + 1))
            .await
            .unwrap_or(false)
        {
            count += 1;
        }
        count
    }
}

/// Serves one blank frame per recorded line and stages that line for the scorer
pub struct ReplayFrameSource {
    name: String,
    lines: VecDeque<String>,
    slot: Slot,
    next_id: u64,
    width: u32,
    height: u32,
}

#[async_trait]
impl FrameSource for ReplayFrameSource {
    async fn next_frame(&mut self) -> Result<Option<FrameData>, DetectionError> {
        let Some(line) = self.lines.pop_front() else {
            debug!("{} exhausted", self.name);
            return Ok(None);
        };

        let id = self.next_id;
        self.next_id += 1;

        let prediction: RawPrediction =
            serde_json::from_str(&line).map_err(|e| DetectionError::FrameSource {
                details: format!("{} frame {}: {}", self.name, id, e),
            })?;
        *self.slot.lock() = Some(prediction);

        Ok(Some(FrameData::blank(id, self.width, self.height)))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Returns whatever the paired frame source staged for the current frame
pub struct ReplayScorer {
    slot: Slot,
}

#[async_trait]
impl Scorer for ReplayScorer {
    async fn score(&self, _input: &InputTensor) -> Result<RawPrediction, DetectionError> {
        self.slot
            .lock()
            .take()
            .ok_or_else(|| DetectionError::ScorerFailed {
                details: "no recorded output staged for this frame".to_string(),
            })
    }

    fn name(&self) -> &str {
        "replay"
    }
}
