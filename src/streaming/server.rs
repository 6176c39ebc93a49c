use crate::{
    board::BoardRegistry,
    config::ServerConfig,
    error::{ChesscamError, Result, StreamError},
    events::EventBus,
    hub::BroadcastHub,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::handlers::{
    boards_handler, fen_socket_handler, health_handler, move_socket_handler, reset_all_handler,
    reset_board_handler,
};
use super::stats::ConnectionStats;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) hub: BroadcastHub,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) keepalive: Duration,
    pub(crate) default_fen: String,
    pub(crate) stats: Arc<ConnectionStats>,
}

impl ServerState {
    pub(crate) fn registry(&self) -> &Arc<BoardRegistry> {
        self.hub.registry()
    }
}

/// HTTP and websocket front end for the boards
pub struct StreamServer {
    pub(crate) config: ServerConfig,
    pub(crate) state: ServerState,
}

impl StreamServer {
    /// Create a new server. `default_fen` is used by resets that name no position.
    pub fn new(
        config: ServerConfig,
        hub: BroadcastHub,
        event_bus: Arc<EventBus>,
        default_fen: String,
    ) -> Self {
        let state = ServerState {
            hub,
            event_bus,
            keepalive: Duration::from_secs(config.keepalive_seconds.max(1)),
            default_fen,
            stats: Arc::new(ConnectionStats::default()),
        };

        Self { config, state }
    }

    pub fn builder() -> StreamServerBuilder {
        StreamServerBuilder::new()
    }

    /// Configured listen address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/moves/:board_id", get(move_socket_handler))
            .route("/fen/:board_id", get(fen_socket_handler))
            .route("/boards", get(boards_handler))
            .route("/boards/reset", post(reset_all_handler))
            .route("/boards/:board_id/reset", post(reset_board_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();
        TcpListener::bind(&addr).await.map_err(|e| {
            ChesscamError::Stream(StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })
        })
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local: Option<SocketAddr> = listener.local_addr().ok();
        info!(
            "Board server listening on {}",
            local
                .map(|a| a.to_string())
                .unwrap_or_else(|| self.address())
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Board server stopped");
        Ok(())
    }

    /// Bind and serve
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting board server on {}", self.address());
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<ServerConfig>,
    hub: Option<BroadcastHub>,
    event_bus: Option<Arc<EventBus>>,
    default_fen: Option<String>,
}

impl StreamServerBuilder {
    /// Create a new stream server builder
    pub fn new() -> Self {
        Self {
            config: None,
            hub: None,
            event_bus: None,
            default_fen: None,
        }
    }

    /// Set the server configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the broadcast hub
    pub fn hub(mut self, hub: BroadcastHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Set the event bus
    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set the position used by resets that name none
    pub fn default_fen(mut self, fen: impl Into<String>) -> Self {
        self.default_fen = Some(fen.into());
        self
    }

    /// Build the stream server
    pub fn build(self) -> Result<StreamServer> {
        let config = self.config.ok_or_else(|| {
            ChesscamError::Stream(StreamError::StartupFailed {
                details: "Server configuration is required".to_string(),
            })
        })?;

        let hub = self.hub.ok_or_else(|| {
            ChesscamError::Stream(StreamError::StartupFailed {
                details: "Broadcast hub is required".to_string(),
            })
        })?;

        let event_bus = self.event_bus.ok_or_else(|| {
            ChesscamError::Stream(StreamError::StartupFailed {
                details: "Event bus is required".to_string(),
            })
        })?;

        let default_fen = self
            .default_fen
            .unwrap_or_else(|| crate::chess::STARTING_FEN.to_string());

        Ok(StreamServer::new(config, hub, event_bus, default_fen))
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
