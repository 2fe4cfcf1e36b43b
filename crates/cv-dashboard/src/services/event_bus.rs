use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::services::polling::{JobOutcome, JobProgress};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum SystemEvent {
    JobProgress(JobProgress),
    JobFinished { job_id: String, outcome: JobOutcome },
}

impl SystemEvent {
    pub fn job_id(&self) -> &str {
        match self {
            SystemEvent::JobProgress(progress) => &progress.job_id,
            SystemEvent::JobFinished { job_id, .. } => job_id,
        }
    }

    /// SSE event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            SystemEvent::JobProgress(_) => "progress",
            SystemEvent::JobFinished { .. } => "finished",
        }
    }
}

/// Fan-out of job watcher events to SSE subscribers.
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: SystemEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Event for job {} dropped, no subscribers", e.0.job_id());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }
}
