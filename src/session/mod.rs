//! Session lifecycle: provisioning camera feeds, running one worker per
//! board, and coordinating startup and shutdown with the stream server.

mod camera;
mod orchestrator;
mod replay;
mod runtime;
mod shutdown;
mod startup;
pub mod state;
mod types;
mod worker;


pub use camera::{BoardFeed, CameraProvider, FrameSource, UnavailableCameraProvider};
pub use orchestrator::{ChesscamOrchestrator, ShutdownHandle};
pub use replay::{ReplayCameraProvider, ReplayFrameSource, ReplayScorer};
pub use types::{ComponentState, ShutdownReason};
pub use worker::{BoardWorker, WorkerHandle, WorkerStats};
