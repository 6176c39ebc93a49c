use super::camera::FrameSource;
use crate::board::BoardRegistry;
use crate::config::CalibrationConfig;
use crate::detection::DetectionPipeline;
use crate::error::DetectionError;
use crate::events::{ChesscamEvent, EventBus};
use crate::frame::FrameData;
use crate::geometry::BoardGeometry;
use crate::hub::BroadcastHub;
use crate::reconciler::ReconcileOutcome;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counters a worker reports when it stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames: u64,
    pub skipped: u64,
    pub moves: u64,
    pub withheld: u64,
}

/// A running worker and the token that stops it
pub struct WorkerHandle {
    pub board_id: u32,
    pub cancel: CancellationToken,
    pub task: JoinHandle<WorkerStats>,
}

/// Detect-reconcile loop for one board.
///
/// The worker looks its board up by id on every frame, so a reset that swaps
/// in a fresh board is picked up on the next frame.
pub struct BoardWorker {
    board_id: u32,
    registry: Arc<BoardRegistry>,
    hub: BroadcastHub,
    event_bus: Arc<EventBus>,
    pipeline: DetectionPipeline,
    frames: Box<dyn FrameSource>,
    calibration: Option<BoardGeometry>,
    fallback: Option<((u32, u32), BoardGeometry)>,
    frame_interval: Duration,
}

impl BoardWorker {
    pub fn new(
        board_id: u32,
        registry: Arc<BoardRegistry>,
        hub: BroadcastHub,
        event_bus: Arc<EventBus>,
        pipeline: DetectionPipeline,
        frames: Box<dyn FrameSource>,
        calibration: Option<&CalibrationConfig>,
    ) -> crate::error::Result<Self> {
        let calibration = calibration
            .map(|c| BoardGeometry::from_corners(c.corners))
            .transpose()?;
        let max_fps = pipeline.config().max_fps.max(1);

        Ok(Self {
            board_id,
            registry,
            hub,
            event_bus,
            pipeline,
            frames,
            calibration,
            fallback: None,
            frame_interval: Duration::from_micros(1_000_000 / max_fps as u64),
        })
    }

    /// Run on the current runtime until cancelled or the source runs dry
    pub fn spawn(self, cancel: CancellationToken) -> WorkerHandle {
        let board_id = self.board_id;
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        WorkerHandle {
            board_id,
            cancel,
            task,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> WorkerStats {
        info!(
            "Board {} worker started ({}, {} scorer, {:?} per frame)",
            self.board_id,
            self.frames.name(),
            self.pipeline.scorer_name(),
            self.frame_interval
        );

        let mut stats = WorkerStats::default();
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.frames.next_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Board {} frame source ended", self.board_id);
                    break;
                }
                Err(e) => {
                    stats.skipped += 1;
                    self.skip(0, e.to_string()).await;
                    continue;
                }
            };

            stats.frames += 1;
            if !self.process(&frame, &mut stats).await {
                break;
            }
        }

        info!(
            "Board {} worker stopped: {} frames, {} skipped, {} moves, {} withheld",
            self.board_id, stats.frames, stats.skipped, stats.moves, stats.withheld
        );
        stats
    }

    /// One frame through detection and reconciliation. Returns false when the
    /// board no longer exists.
    async fn process(&mut self, frame: &FrameData, stats: &mut WorkerStats) -> bool {
        let board = match self.registry.lookup(self.board_id) {
            Ok(board) => board,
            Err(_) => {
                info!("Board {} is no longer registered", self.board_id);
                return false;
            }
        };

        let snapshot = match self.geometry_for(frame) {
            Ok(geometry) => self.pipeline.snapshot(frame, &geometry).await,
            Err(e) => Err(e),
        };
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stats.skipped += 1;
                self.skip(frame.id, e.to_string()).await;
                return true;
            }
        };

        if snapshot.is_empty() && !board.last_occupancy().is_empty() {
            stats.skipped += 1;
            self.skip(frame.id, "no piece mapped onto the board".to_string())
                .await;
            return true;
        }

        let reconciled = board.reconcile(snapshot);
        match &reconciled.outcome {
            ReconcileOutcome::Emitted(mv) => {
                stats.moves += 1;
                self.emit(ChesscamEvent::MoveReconciled {
                    board_id: self.board_id,
                    uci: mv.uci(),
                    ply: reconciled.history_len,
                    timestamp: SystemTime::now(),
                })
                .await;
                self.hub
                    .report_drops(self.board_id, &reconciled.fanout)
                    .await;
            }
            ReconcileOutcome::Pending {
                changed_squares,
                clean: false,
            } => {
                stats.withheld += 1;
                debug!(
                    "Board {} frame {}: withholding {}-square change",
                    self.board_id, frame.id, changed_squares
                );
                self.emit(ChesscamEvent::ReconciliationWithheld {
                    board_id: self.board_id,
                    changed_squares: *changed_squares,
                    timestamp: SystemTime::now(),
                })
                .await;
            }
            ReconcileOutcome::Pending { clean: true, .. } => {
                debug!(
                    "Board {} frame {}: awaiting confirmation",
                    self.board_id, frame.id
                );
            }
            ReconcileOutcome::Reverted => {
                debug!(
                    "Board {} frame {}: change reverted",
                    self.board_id, frame.id
                );
            }
            ReconcileOutcome::NoChange => {}
        }

        true
    }

    /// Calibrated geometry, or the whole frame for uncalibrated boards
    fn geometry_for(&mut self, frame: &FrameData) -> Result<BoardGeometry, DetectionError> {
        if let Some(geometry) = &self.calibration {
            return Ok(geometry.clone());
        }

        let dims = (frame.width, frame.height);
        if let Some((cached, geometry)) = &self.fallback {
            if *cached == dims {
                return Ok(geometry.clone());
            }
        }

        let geometry = BoardGeometry::axis_aligned(frame.width, frame.height)?;
        self.fallback = Some((dims, geometry.clone()));
        Ok(geometry)
    }

    async fn skip(&self, frame_id: u64, reason: String) {
        self.emit(ChesscamEvent::FrameSkipped {
            board_id: self.board_id,
            frame_id,
            reason,
        })
        .await;
    }

    async fn emit(&self, event: ChesscamEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("Board {} event not delivered: {}", self.board_id, e);
        }
    }
}
