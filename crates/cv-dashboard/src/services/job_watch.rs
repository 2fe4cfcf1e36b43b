use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::document::JobId;
use crate::services::backend::JobStatusBackend;
use crate::services::event_bus::{EventBus, SystemEvent};
use crate::services::polling::{JobStatusWatcher, WatchConfig};

/// Live job watchers, one per job id.
///
/// Every watcher runs on a child of the shutdown token, so cancelling that
/// token stops all of them. Progress and outcomes go to the event bus.
pub struct JobWatchRegistry {
    backend: Arc<dyn JobStatusBackend>,
    config: WatchConfig,
    events: Arc<EventBus>,
    shutdown: CancellationToken,
    watchers: Arc<DashMap<JobId, CancellationToken>>,
}

impl JobWatchRegistry {
    pub fn new(
        backend: Arc<dyn JobStatusBackend>,
        config: WatchConfig,
        events: Arc<EventBus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backend,
            config,
            events,
            shutdown,
            watchers: Arc::new(DashMap::new()),
        }
    }

    /// Starts watching `job_id` and returns the new watcher's token, or
    /// `None` when a watcher for it is already running.
    pub fn watch(&self, job_id: JobId) -> Option<CancellationToken> {
        let token = self.shutdown.child_token();

        match self.watchers.entry(job_id.clone()) {
            Entry::Occupied(existing) if !existing.get().is_cancelled() => {
                debug!("Job {} is already being watched", job_id);
                return None;
            }
            Entry::Occupied(mut existing) => {
                existing.insert(token.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        let watcher = JobStatusWatcher::with_token(
            self.backend.clone(),
            job_id.clone(),
            self.config.clone(),
            token.clone(),
        );
        let events = self.events.clone();
        let watchers = self.watchers.clone();

        tokio::spawn(async move {
            let outcome = watcher
                .watch(|progress| events.publish(SystemEvent::JobProgress(progress.clone())))
                .await;

            info!("Watcher for job {} finished: {:?}", job_id, outcome);
            events.publish(SystemEvent::JobFinished {
                job_id: job_id.clone(),
                outcome,
            });
            watchers.remove_if(&job_id, |_, token| token.is_cancelled());
        });

        Some(token)
    }

    pub fn cancel(&self, job_id: &str) -> bool {
        match self.watchers.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, job_id: &str) -> bool {
        self.watchers
            .get(job_id)
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn active_count(&self) -> usize {
        self.watchers
            .iter()
            .filter(|entry| !entry.value().is_cancelled())
            .count()
    }
}
