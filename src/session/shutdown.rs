use super::state::{SESSION_COMPONENT, STREAMING_COMPONENT};
use super::{ChesscamOrchestrator, ComponentState};
use crate::error::{ChesscamError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
#[cfg(feature = "streaming")]
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl ChesscamOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // Workers and boards first: clearing the registry closes every
        // subscriber connection so the server can drain
        if let Err(e) = self.stop_component(SESSION_COMPONENT).await {
            error!("Error stopping {}: {}", SESSION_COMPONENT, e);
            exit_code = 1;
        }

        if let Err(e) = self.stop_component(STREAMING_COMPONENT).await {
            error!("Error stopping {}: {}", STREAMING_COMPONENT, e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&mut self, component: &str) -> Result<()> {
        if self.get_component_state(component).await.is_none() {
            return Ok(());
        }

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let result = match component {
            SESSION_COMPONENT => {
                self.stop_workers().await;
                self.registry.clear();
                Ok(())
            }
            #[cfg(feature = "streaming")]
            STREAMING_COMPONENT => self.stop_server().await,
            _ => Ok(()),
        };

        match &result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
            }
        }
        result
    }

    /// Cancel and join every board worker. Returns how many were stopped.
    pub(super) async fn stop_workers(&mut self) -> usize {
        let handles: Vec<_> = self.workers.drain(..).collect();
        for handle in &handles {
            handle.cancel.cancel();
        }

        let count = handles.len();
        for mut handle in handles {
            match timeout(WORKER_STOP_TIMEOUT, &mut handle.task).await {
                Ok(Ok(stats)) => debug!("Board {} worker joined: {:?}", handle.board_id, stats),
                Ok(Err(e)) => warn!("Board {} worker ended abnormally: {}", handle.board_id, e),
                Err(_) => {
                    warn!(
                        "Board {} worker did not stop within {:?}; aborting",
                        handle.board_id, WORKER_STOP_TIMEOUT
                    );
                    handle.task.abort();
                }
            }
        }
        count
    }

    #[cfg(feature = "streaming")]
    async fn stop_server(&mut self) -> Result<()> {
        let Some(mut task) = self.server_task.take() else {
            return Ok(());
        };

        match timeout(SERVER_STOP_TIMEOUT, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ChesscamError::component(
                STREAMING_COMPONENT,
                format!("server task failed: {}", e),
            )),
            Err(_) => {
                task.abort();
                Err(ChesscamError::component(
                    STREAMING_COMPONENT,
                    format!("server did not stop within {:?}", SERVER_STOP_TIMEOUT),
                ))
            }
        }
    }
}
