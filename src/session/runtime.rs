use super::{ChesscamOrchestrator, ShutdownHandle, ShutdownReason};
use crate::error::{ChesscamError, Result};
use crate::events::ChesscamEvent;
use std::time::SystemTime;
use tracing::{info, warn};

impl ChesscamOrchestrator {
    /// Run until a signal or a shutdown request, then shut down gracefully.
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Chesscam is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ChesscamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| ChesscamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {}", shutdown_reason);
        let _ = self
            .event_bus
            .publish(ChesscamEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: shutdown_reason.to_string(),
            })
            .await;

        let mut exit_code = self.shutdown().await?;
        if matches!(shutdown_reason, ShutdownReason::Error(_)) {
            exit_code = 1;
        }

        info!("Chesscam shutdown complete");
        Ok(exit_code)
    }

    /// SIGTERM (unix) and Ctrl+C both request a graceful shutdown
    fn setup_signal_handlers(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    let handle = self.shutdown_handle();
                    let token = self.cancellation_token.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            Some(()) = sigterm.recv() => {
                                info!("Received SIGTERM signal");
                                handle.trigger(ShutdownReason::Signal("SIGTERM".to_string())).await;
                            }
                        }
                    });
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        }

        let handle: ShutdownHandle = self.shutdown_handle();
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Received SIGINT signal (Ctrl+C)");
                        handle.trigger(ShutdownReason::Signal("SIGINT".to_string())).await;
                    }
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                },
            }
        });
    }
}
