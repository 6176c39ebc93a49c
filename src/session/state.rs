use super::{ChesscamOrchestrator, ComponentState};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Board workers and the registry they feed
pub const SESSION_COMPONENT: &str = "session";
/// HTTP and websocket server
pub const STREAMING_COMPONENT: &str = "streaming";

impl ChesscamOrchestrator {
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut states = self.component_states.lock().await;
        let previous = states.insert(component.to_string(), state.clone());
        if state == ComponentState::Failed {
            warn!("Component '{}' failed (was {:?})", component, previous);
        } else {
            debug!("Component '{}' state changed to: {:?}", component, state);
        }
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        let states = self.component_states.lock().await;
        states.get(component).cloned()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        let states = self.component_states.lock().await;
        states.clone()
    }

    pub async fn is_running(&self, component: &str) -> bool {
        self.get_component_state(component).await == Some(ComponentState::Running)
    }
}
