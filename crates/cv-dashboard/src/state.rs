use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::backend::DocumentBackend;
use crate::services::{ConversationManager, EventBus, HealthMonitor, JobWatchRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub conversation_manager: Arc<ConversationManager>,
    pub health_monitor: Arc<HealthMonitor>,
    pub job_watches: Arc<JobWatchRegistry>,
    pub documents: Arc<dyn DocumentBackend>,
    pub event_bus: Arc<EventBus>,
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}

impl FromRef<AppState> for Arc<HealthMonitor> {
    fn from_ref(state: &AppState) -> Self {
        state.health_monitor.clone()
    }
}

impl FromRef<AppState> for Arc<JobWatchRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.job_watches.clone()
    }
}

impl FromRef<AppState> for Arc<dyn DocumentBackend> {
    fn from_ref(state: &AppState) -> Self {
        state.documents.clone()
    }
}

impl FromRef<AppState> for Arc<EventBus> {
    fn from_ref(state: &AppState) -> Self {
        state.event_bus.clone()
    }
}
