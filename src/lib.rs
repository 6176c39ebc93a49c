pub mod board;
pub mod chess;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod hub;
pub mod reconciler;
pub mod session;

#[cfg(feature = "streaming")]
pub mod streaming;

pub use board::{Board, BoardRegistry, BoardStatus, ChannelKind, ClientId, Outbound};
pub use chess::{MoveRecord, PieceClass, Position, Snapshot, Square, STARTING_FEN};
pub use config::ChesscamConfig;
pub use detection::{DetectionPipeline, PieceObservation, RawPrediction, Scorer};
pub use error::{BoardError, ChesscamError, DetectionError, Result};
pub use events::{ChesscamEvent, EventBus};
pub use frame::{FrameData, FrameFormat};
pub use geometry::BoardGeometry;
pub use hub::{BroadcastHub, Subscription, SubscriptionGuard};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use session::{
    CameraProvider, ChesscamOrchestrator, ComponentState, FrameSource, ReplayCameraProvider,
    ShutdownHandle, ShutdownReason, UnavailableCameraProvider,
};

#[cfg(feature = "streaming")]
pub use streaming::{StreamServer, StreamServerBuilder};
