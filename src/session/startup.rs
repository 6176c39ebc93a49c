use super::state::{SESSION_COMPONENT, STREAMING_COMPONENT};
use super::worker::BoardWorker;
use super::{ChesscamOrchestrator, ComponentState};
use crate::detection::DetectionPipeline;
use crate::error::{BoardError, Result};
use crate::events::ChesscamEvent;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

impl ChesscamOrchestrator {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing chesscam components");

        let mut states = self.component_states.lock().await;
        states.insert(SESSION_COMPONENT.to_string(), ComponentState::Stopped);
        #[cfg(feature = "streaming")]
        states.insert(STREAMING_COMPONENT.to_string(), ComponentState::Stopped);
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the stream server, then the configured session if any
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting chesscam");

        #[cfg(feature = "streaming")]
        self.start_server().await?;

        let count = self.config.session.board_count;
        if count > 0 {
            let fen = self.config.session.initial_fen.clone();
            self.start_session(count, &fen).await?;
        } else {
            info!("No boards configured; waiting for a session to be started");
        }

        info!("Chesscam started successfully");
        Ok(())
    }

    #[cfg(feature = "streaming")]
    async fn start_server(&mut self) -> Result<()> {
        use crate::streaming::StreamServer;

        self.set_component_state(STREAMING_COMPONENT, ComponentState::Starting)
            .await;

        let server = StreamServer::builder()
            .config(self.config.server.clone())
            .hub(self.hub.clone())
            .event_bus(Arc::clone(&self.event_bus))
            .default_fen(self.config.session.initial_fen.clone())
            .build()?;

        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.set_component_state(STREAMING_COMPONENT, ComponentState::Failed)
                    .await;
                error!("Failed to start stream server: {}", e);
                return Err(e);
            }
        };
        self.local_addr = listener.local_addr().ok();

        let shutdown = self.cancellation_token.child_token();
        let event_bus = Arc::clone(&self.event_bus);
        self.server_task = Some(tokio::spawn(async move {
            let result = server.serve(listener, shutdown).await;
            if let Err(e) = &result {
                let _ = event_bus
                    .publish(ChesscamEvent::SystemError {
                        component: STREAMING_COMPONENT.to_string(),
                        error: e.to_string(),
                    })
                    .await;
            }
            result
        }));

        self.set_component_state(STREAMING_COMPONENT, ComponentState::Running)
            .await;
        info!(
            "Stream server started on {}",
            self.local_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| format!("{}:{}", self.config.server.ip, self.config.server.port))
        );
        Ok(())
    }

    /// Create `count` boards at `initial_fen` and start one worker per board.
    ///
    /// The new boards and workers are fully prepared before anything running
    /// is touched; a failure leaves the current session as it was. On success
    /// the previous workers are stopped and the registry is swapped in one step.
    pub async fn start_session(&mut self, count: usize, initial_fen: &str) -> Result<usize> {
        self.set_component_state(SESSION_COMPONENT, ComponentState::Starting)
            .await;

        let prepared = match self.prepare_session(count, initial_fen).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Failed to start a {}-board session: {}", count, e);
                let state = if self.registry.is_empty() {
                    ComponentState::Failed
                } else {
                    ComponentState::Running
                };
                self.set_component_state(SESSION_COMPONENT, state).await;
                return Err(e);
            }
        };
        let (boards, workers) = prepared;

        let stopped = self.stop_workers().await;
        if stopped > 0 {
            info!("Stopped {} workers from the previous session", stopped);
        }
        self.registry.install(boards);

        for worker in workers {
            let handle = worker.spawn(self.cancellation_token.child_token());
            self.workers.push(handle);
        }

        let _ = self
            .event_bus
            .publish(ChesscamEvent::SessionStarted {
                board_count: count,
                initial_fen: initial_fen.trim().to_string(),
                timestamp: SystemTime::now(),
            })
            .await;

        self.set_component_state(SESSION_COMPONENT, ComponentState::Running)
            .await;
        Ok(count)
    }

    async fn prepare_session(
        &self,
        count: usize,
        initial_fen: &str,
    ) -> Result<(crate::board::BoardMap, Vec<BoardWorker>)> {
        let boards = self.registry.build(count, initial_fen)?;

        let feeds = self.cameras.provision(count).await?;
        if feeds.len() != count {
            warn!(
                "Camera provider returned {} feeds for {} boards",
                feeds.len(),
                count
            );
            return Err(BoardError::CameraUnavailable {
                requested: count,
                available: feeds.len(),
            }
            .into());
        }

        let mut workers = Vec::with_capacity(count);
        for (index, feed) in feeds.into_iter().enumerate() {
            let board_id = index as u32 + 1;
            let pipeline = DetectionPipeline::new(self.config.detection.clone(), feed.scorer);
            workers.push(BoardWorker::new(
                board_id,
                Arc::clone(&self.registry),
                self.hub.clone(),
                Arc::clone(&self.event_bus),
                pipeline,
                feed.frames,
                self.config.calibration_for(board_id),
            )?);
        }

        Ok((boards, workers))
    }
}
