use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::health::HealthStatus;
use crate::services::backend::HealthBackend;
use crate::services::polling::{BackoffPolicy, PollOutcome, PollState, PollingScheduler};

/// Backend health as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub outcome: PollOutcome,
    pub attempt: u32,
    pub waited_ms: u64,
    pub health: HealthStatus,
    /// Components that are not `up`
    pub unhealthy: Vec<&'static str>,
}

impl HealthReport {
    pub fn from_state(state: &PollState<HealthStatus>) -> Self {
        let health = match state.outcome {
            PollOutcome::Down => HealthStatus::all_down(),
            _ => state.last_result.clone().unwrap_or_default(),
        };

        Self {
            outcome: state.outcome,
            attempt: state.attempt,
            waited_ms: u64::try_from(state.waited.as_millis()).unwrap_or(u64::MAX),
            unhealthy: health.not_up(),
            health,
        }
    }
}

/// Keeps a backend health poll running: one chain on start, a new one
/// every refresh interval unless a chain is still retrying, and one on
/// every manual refresh.
pub struct HealthMonitor {
    scheduler: Arc<PollingScheduler<HealthStatus>>,
    refresh_interval: Duration,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        backend: Arc<dyn HealthBackend>,
        policy: BackoffPolicy,
        refresh_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let scheduler = PollingScheduler::new(
            "health",
            policy,
            move || {
                let backend = backend.clone();
                async move { backend.health().await }
            },
            HealthStatus::all_up,
        );

        Self {
            scheduler: Arc::new(scheduler),
            // tokio intervals must not be zero
            refresh_interval: refresh_interval.max(Duration::from_millis(1)),
            shutdown,
        }
    }

    pub fn report(&self) -> HealthReport {
        HealthReport::from_state(&self.scheduler.state())
    }

    /// Cancels the running chain and starts over from the first attempt.
    pub fn refresh(&self) {
        info!("Manual health refresh requested");
        self.scheduler.restart();
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Runs the periodic refresh until the shutdown token fires.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Health monitor started (refresh every {:?})",
                monitor.refresh_interval
            );

            loop {
                tokio::select! {
                    biased;
                    _ = monitor.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if monitor.scheduler.is_active() {
                    debug!("Health poll still retrying, skipping periodic refresh");
                    continue;
                }
                monitor.scheduler.restart();
            }

            monitor.scheduler.cancel();
            info!("Health monitor stopped");
        })
    }
}
