use super::camera::CameraProvider;
use super::types::{ComponentState, ShutdownReason};
use super::worker::WorkerHandle;
use crate::board::BoardRegistry;
use crate::config::ChesscamConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::hub::BroadcastHub;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

type ShutdownSlot = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Coordinates the board registry, the per-board workers and the stream server
pub struct ChesscamOrchestrator {
    pub(super) config: ChesscamConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) registry: Arc<BoardRegistry>,
    pub(super) hub: BroadcastHub,
    pub(super) cameras: Arc<dyn CameraProvider>,

    // Components
    pub(super) workers: Vec<WorkerHandle>,
    #[cfg(feature = "streaming")]
    pub(super) server_task: Option<tokio::task::JoinHandle<Result<()>>>,
    pub(super) local_addr: Option<SocketAddr>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: ShutdownSlot,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

/// Requests a graceful shutdown of a running orchestrator. Only the first
/// request is delivered.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: ShutdownSlot,
}

impl ShutdownHandle {
    /// Returns false if shutdown was already requested
    pub async fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}

impl ChesscamOrchestrator {
    /// Create a new orchestrator. Nothing runs until `start`.
    pub fn new(config: ChesscamConfig, cameras: Arc<dyn CameraProvider>) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let registry = Arc::new(BoardRegistry::new(config.reconciler.confirmation_frames));
        let hub = BroadcastHub::new(
            Arc::clone(&registry),
            Arc::clone(&event_bus),
            config.server.client_queue_capacity,
        );
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            registry,
            hub,
            cameras,
            workers: Vec::new(),
            #[cfg(feature = "streaming")]
            server_task: None,
            local_addr: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ChesscamConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BoardRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Address the stream server actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of board workers currently running
    pub fn worker_count(&self) -> usize {
        self.workers.iter().filter(|w| !w.task.is_finished()).count()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_sender),
        }
    }
}
